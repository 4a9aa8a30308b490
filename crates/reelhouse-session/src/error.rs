//! Recorder error types.

use std::path::PathBuf;

use thiserror::Error;

use reelhouse_archive::ArchiveError;
use reelhouse_core::SessionKey;

/// Errors surfaced by the session registry and recorder.
///
/// `AlreadyRecording` and `NotRecording` are expected outcomes that callers
/// handle routinely; nothing here is fatal to the host.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Already recording: {0}")]
    AlreadyRecording(SessionKey),

    #[error("Not recording: {0}")]
    NotRecording(SessionKey),

    #[error("Archive path already in use: {}", .0.display())]
    PathConflict(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt archive {}: {reason}", path.display())]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("Subject unavailable: {0}")]
    SubjectUnavailable(SessionKey),

    #[error("Subject filtered out by recording policy: {0}")]
    Filtered(SessionKey),

    #[error("Archive error: {0}")]
    Archive(ArchiveError),

    #[error(transparent)]
    Core(#[from] reelhouse_core::Error),
}

impl From<ArchiveError> for RecorderError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::PathConflict(path) => RecorderError::PathConflict(path),
            ArchiveError::Io(e) => RecorderError::Io(e),
            ArchiveError::Corrupt { path, reason } => RecorderError::CorruptArchive { path, reason },
            other => RecorderError::Archive(other),
        }
    }
}

impl RecorderError {
    /// Whether this is a routine registry outcome rather than a failure.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            RecorderError::AlreadyRecording(_)
                | RecorderError::NotRecording(_)
                | RecorderError::Filtered(_)
        )
    }

    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            RecorderError::AlreadyRecording(_) => Some("Stop the existing session first"),
            RecorderError::NotRecording(_) => Some("List active sessions to see what is recording"),
            RecorderError::Io(_) => {
                Some("Check that the recording directory exists and is writable")
            }
            RecorderError::CorruptArchive { .. } => {
                Some("The archive was not sealed; it is kept for inspection")
            }
            RecorderError::SubjectUnavailable(_) => Some("The subject must be online to record"),
            RecorderError::Core(e) => e.recovery_suggestion(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_errors_map_to_taxonomy() {
        let err: RecorderError = ArchiveError::PathConflict(PathBuf::from("/a")).into();
        assert!(matches!(err, RecorderError::PathConflict(_)));

        let err: RecorderError = ArchiveError::Corrupt {
            path: PathBuf::from("/a"),
            reason: "missing metadata member".to_string(),
        }
        .into();
        assert!(matches!(err, RecorderError::CorruptArchive { .. }));
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_expected_outcomes() {
        let key = SessionKey::Custom("tower".to_string());
        assert!(RecorderError::AlreadyRecording(key.clone()).is_expected());
        assert!(RecorderError::NotRecording(key.clone()).is_expected());
        assert!(!RecorderError::SubjectUnavailable(key).is_expected());
    }
}
