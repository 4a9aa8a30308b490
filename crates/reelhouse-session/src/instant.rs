//! Instant replays: a sealed copy of the last few minutes of a live session.

use std::path::{Path, PathBuf};

use chrono::Duration;
use tracing::info;

use reelhouse_archive::{ArchiveMetadata, ArchiveWriter};
use reelhouse_core::{Clock, Marker, SessionKey};

use crate::error::{RecorderError, Result};
use crate::registry::SessionRegistry;

impl SessionRegistry {
    /// Write the events captured within the last `window` of the session
    /// under `key` into a fresh archive in `dir`.
    ///
    /// The live session keeps recording and its buffer is left untouched.
    pub fn save_instant_replay(&self, key: &SessionKey, dir: &Path, window: Duration) -> Result<PathBuf> {
        let session = self
            .get(key)
            .ok_or_else(|| RecorderError::NotRecording(key.clone()))?;

        let (events, window_start) = session.snapshot_window(window);
        let now = self.clock().now();
        let path = self.naming().next_path(dir, session.subject_name(), now)?;

        let context = self.context();
        let meta = ArchiveMetadata::new(
            &context.server_name,
            session.subject_name(),
            key.to_string(),
            window_start.timestamp_millis(),
        )
        .with_protocol(context.protocol_version, &context.host_version);

        let mut writer = ArchiveWriter::open(&path, self.claims())?;
        writer.write_metadata(&meta)?;
        writer.append_events(&events)?;
        let sealed = writer.seal(
            &meta.finalized(now.timestamp_millis()),
            &[Marker::new("start", 0)],
        )?;

        info!(
            key = %key,
            events = events.len(),
            path = %sealed.display(),
            "Instant replay saved"
        );
        Ok(sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryOptions;
    use crate::testing::TestSubject;
    use reelhouse_archive::Archive;
    use reelhouse_core::ManualClock;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_instant_replay_copies_window() {
        let tmp = TempDir::new().unwrap();
        let clock = ManualClock::at(2024, 5, 17, 12, 0, 0);
        let reg = SessionRegistry::new(
            RegistryOptions::new(tmp.path().join("recordings")),
            Arc::new(clock.clone()),
        );
        let key = SessionKey::Custom("cam-one".into());
        let session = reg.start_session(key.clone(), TestSubject::online("alice")).unwrap();

        session.record_event(b"too old".to_vec());
        clock.advance(Duration::minutes(10));
        session.record_event(b"fresh".to_vec());
        clock.advance(Duration::minutes(1));

        let replay_dir = tmp.path().join("instant");
        let path = reg
            .save_instant_replay(&key, &replay_dir, Duration::minutes(5))
            .unwrap();
        assert!(path.starts_with(&replay_dir));

        let archive = Archive::open(&path).unwrap();
        assert_eq!(archive.events.len(), 1);
        assert_eq!(archive.events[0].payload, b"fresh");
        assert_eq!(archive.metadata.duration, 300);

        assert!(reg.is_active(&key));
        assert_eq!(session.event_count(), 2);
    }

    #[test]
    fn test_instant_replay_requires_active_session() {
        let tmp = TempDir::new().unwrap();
        let reg = SessionRegistry::new(
            RegistryOptions::new(tmp.path()),
            Arc::new(ManualClock::at(2024, 5, 17, 12, 0, 0)),
        );
        let err = reg
            .save_instant_replay(&SessionKey::Custom("nobody".into()), tmp.path(), Duration::minutes(5))
            .unwrap_err();
        assert!(matches!(err, RecorderError::NotRecording(_)));
    }
}
