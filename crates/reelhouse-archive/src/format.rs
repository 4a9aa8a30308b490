//! Archive member names, metadata record and event payload framing.

use std::path::Path;

use serde::{Deserialize, Serialize};

use reelhouse_core::CaptureEvent;

use crate::error::{ArchiveError, Result};

/// Member holding the JSON metadata record.
pub const METADATA_MEMBER: &str = "metadata";
/// Member holding the framed event payload.
pub const EVENTS_MEMBER: &str = "events";
/// Member holding the JSON marker list.
pub const MARKERS_MEMBER: &str = "markers";

/// Container format name written into metadata.
pub const FORMAT_NAME: &str = "REELHOUSE";
/// Container format version written into metadata.
pub const FORMAT_VERSION: u32 = 1;
/// Generator identity written into metadata.
pub const GENERATOR: &str = concat!("reelhouse ", env!("CARGO_PKG_VERSION"));

/// Size of a frame header: offset then length, both big-endian u32.
const FRAME_HEADER: usize = 8;

/// The structured metadata record of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    pub server_name: String,
    pub subject_name: String,
    /// Session key the archive was recorded under
    pub recording_key: String,
    pub generator: String,
    pub file_format: String,
    pub file_format_version: u32,
    pub protocol: u32,
    pub host_version: String,
    /// Wall-clock start, epoch milliseconds (UTC)
    pub date: i64,
    /// Wall-clock end, epoch milliseconds (UTC); unset until sealed
    #[serde(default)]
    pub ended_at: Option<i64>,
    /// Whole seconds, updated on seal
    pub duration: u64,
}

impl ArchiveMetadata {
    /// Build the initial record for a session starting at `started_at_ms`.
    pub fn new(
        server_name: impl Into<String>,
        subject_name: impl Into<String>,
        recording_key: impl Into<String>,
        started_at_ms: i64,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            subject_name: subject_name.into(),
            recording_key: recording_key.into(),
            generator: GENERATOR.to_string(),
            file_format: FORMAT_NAME.to_string(),
            file_format_version: FORMAT_VERSION,
            protocol: 0,
            host_version: String::new(),
            date: started_at_ms,
            ended_at: None,
            duration: 0,
        }
    }

    pub fn with_protocol(mut self, protocol: u32, host_version: impl Into<String>) -> Self {
        self.protocol = protocol;
        self.host_version = host_version.into();
        self
    }

    /// The record as it should be sealed, given the end time.
    pub fn finalized(&self, ended_at_ms: i64) -> Self {
        Self {
            ended_at: Some(ended_at_ms),
            duration: duration_secs(self.date, ended_at_ms),
            ..self.clone()
        }
    }
}

/// Whole seconds between two epoch-millisecond instants, rounded to the
/// nearest second and clamped at zero.
pub fn duration_secs(started_at_ms: i64, ended_at_ms: i64) -> u64 {
    let delta = ended_at_ms.saturating_sub(started_at_ms);
    if delta <= 0 {
        return 0;
    }
    (delta as u64 + 500) / 1000
}

/// Encode events as concatenated `[offset][len][bytes]` frames.
pub fn encode_events(events: &[CaptureEvent]) -> Vec<u8> {
    let size = events
        .iter()
        .map(|e| FRAME_HEADER + e.payload.len())
        .sum();
    let mut out = Vec::with_capacity(size);
    for event in events {
        out.extend_from_slice(&event.offset_ms.to_be_bytes());
        out.extend_from_slice(&(event.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&event.payload);
    }
    out
}

/// Decode a framed payload. `path` is only used for error reporting.
pub fn decode_events(path: &Path, mut bytes: &[u8]) -> Result<Vec<CaptureEvent>> {
    let mut events = Vec::new();
    while !bytes.is_empty() {
        if bytes.len() < FRAME_HEADER {
            return Err(ArchiveError::corrupt(path, "truncated event frame header"));
        }
        let offset_ms = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        bytes = &bytes[FRAME_HEADER..];
        if bytes.len() < len {
            return Err(ArchiveError::corrupt(path, "truncated event frame body"));
        }
        events.push(CaptureEvent::new(offset_ms, &bytes[..len]));
        bytes = &bytes[len..];
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_rounds_to_nearest_second() {
        assert_eq!(duration_secs(0, 1_499), 1);
        assert_eq!(duration_secs(0, 1_500), 2);
        assert_eq!(duration_secs(1_000, 1_000), 0);
    }

    #[test]
    fn test_duration_clamps_backward_clock() {
        assert_eq!(duration_secs(10_000, 4_000), 0);
        assert_eq!(duration_secs(i64::MAX, i64::MIN), 0);
    }

    #[test]
    fn test_finalized_sets_end_and_duration() {
        let meta = ArchiveMetadata::new("srv", "alice", "key", 1_000);
        let sealed = meta.finalized(62_000);
        assert_eq!(sealed.duration, 61);
        assert_eq!(sealed.ended_at, Some(62_000));
        assert_eq!(sealed.subject_name, "alice");
    }

    #[test]
    fn test_truncated_payload_is_corrupt() {
        let bytes = encode_events(&[CaptureEvent::new(5, b"hello".to_vec())]);
        let err = decode_events(Path::new("x"), &bytes[..bytes.len() - 2]).unwrap_err();
        assert!(err.is_corrupt());
        let err = decode_events(Path::new("x"), &bytes[..3]).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_metadata_uses_camel_case_keys() {
        let meta = ArchiveMetadata::new("srv", "alice", "key", 42);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["serverName"], "srv");
        assert_eq!(json["subjectName"], "alice");
        assert_eq!(json["date"], 42);
        assert_eq!(json["fileFormatVersion"], FORMAT_VERSION);
    }
}
