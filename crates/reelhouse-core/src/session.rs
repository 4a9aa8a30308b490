//! Session identity, lifecycle state and capture primitives.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::Error;

/// Identity under which a session is registered.
///
/// A subject session is keyed by the subject's UUID; a custom session (a
/// free camera, a named viewpoint) is keyed by an operator-chosen label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SessionKey {
    /// Keyed by the recorded subject's id
    Subject(Uuid),
    /// Keyed by an operator label
    Custom(String),
}

impl SessionKey {
    /// Build a custom key, validating the label against the given bounds.
    pub fn custom(label: impl Into<String>, min: usize, max: usize) -> Result<Self, Error> {
        let label = label.into();
        validate_label(&label, min, max)?;
        Ok(SessionKey::Custom(label))
    }

    /// Whether this is a custom (non-subject) session key.
    pub fn is_custom(&self) -> bool {
        matches!(self, SessionKey::Custom(_))
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKey::Subject(id) => write!(f, "{}", id),
            SessionKey::Custom(label) => write!(f, "custom:{}", label),
        }
    }
}

impl From<Uuid> for SessionKey {
    fn from(id: Uuid) -> Self {
        SessionKey::Subject(id)
    }
}

/// Validate a custom session label.
pub fn validate_label(label: &str, min: usize, max: usize) -> Result<(), Error> {
    let len = label.chars().count();
    if len < min || len > max {
        return Err(Error::InvalidLabel {
            label: label.to_string(),
            reason: format!("length must be between {} and {} characters", min, max),
        });
    }
    if !label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidLabel {
            label: label.to_string(),
            reason: "only letters, digits, '_' and '-' are allowed".to_string(),
        });
    }
    Ok(())
}

/// Session state in its lifecycle.
///
/// `Closed` and `Failed` are terminal. Only `Created` and `Recording`
/// sessions are ever visible through the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Registered, archive not yet opened
    Created,
    /// Archive open, accepting events
    Recording,
    /// Being sealed; new events are dropped
    Finalizing,
    /// Sealed successfully
    Closed,
    /// An unrecoverable I/O error occurred
    Failed,
}

impl SessionState {
    /// Whether the state is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// Whether a registry entry may be in this state.
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Created | SessionState::Recording)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::Recording => "recording",
            SessionState::Finalizing => "finalizing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One captured event, stamped with its offset from the session start.
///
/// The payload is opaque to the recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureEvent {
    /// Milliseconds since the session started
    pub offset_ms: u32,
    /// Raw event bytes
    pub payload: Vec<u8>,
}

impl CaptureEvent {
    pub fn new(offset_ms: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            offset_ms,
            payload: payload.into(),
        }
    }
}

/// A named point in time within a recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    /// Marker name
    pub name: String,
    /// Milliseconds since the session started
    pub time: u32,
}

impl Marker {
    pub fn new(name: impl Into<String>, time: u32) -> Self {
        Self {
            name: name.into(),
            time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_key_validation() {
        assert!(SessionKey::custom("north-gate", 5, 16).is_ok());
        assert!(SessionKey::custom("cam", 5, 16).is_err());
        assert!(SessionKey::custom("a-very-long-camera-label", 5, 16).is_err());
        assert!(SessionKey::custom("bad/label", 5, 16).is_err());
    }

    #[test]
    fn test_key_display() {
        let id = Uuid::nil();
        assert_eq!(
            SessionKey::Subject(id).to_string(),
            "00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            SessionKey::Custom("tower".to_string()).to_string(),
            "custom:tower"
        );
    }

    #[test]
    fn test_state_classification() {
        assert!(SessionState::Created.is_live());
        assert!(SessionState::Recording.is_live());
        assert!(!SessionState::Finalizing.is_live());
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Recording.is_terminal());
    }
}
