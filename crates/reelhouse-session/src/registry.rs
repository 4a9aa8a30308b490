//! Session registry.
//!
//! Maps session keys to live sessions. At most one session exists per key.
//! Starts are serialized so path allocation and archive creation never race;
//! stops remove the entry and move the session to `Finalizing` under the
//! same lock, so lookups never observe a closing session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use reelhouse_archive::{day_partition, NamingPolicy, PathClaims};
use reelhouse_core::{Clock, Config, SessionKey, Subject};

use crate::error::{RecorderError, Result};
use crate::session::{ArchiveContext, Session};

/// Settings a registry needs to place and describe archives.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Recording root; day partitions are created beneath it
    pub root: PathBuf,
    /// Archive extension, without the dot
    pub extension: String,
    /// Metadata shared by every archive
    pub context: ArchiveContext,
}

impl RegistryOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "mcpr".to_string(),
            context: ArchiveContext::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.recording.root.clone(),
            extension: config.recording.extension.clone(),
            context: ArchiveContext {
                server_name: config.recording.server_name.clone(),
                protocol_version: config.recording.protocol_version,
                host_version: config.recording.host_version.clone(),
            },
        }
    }
}

/// Handle to a live session, for feeding events.
pub type SessionHandle = Arc<Session>;

/// Concurrency-safe registry of active sessions.
pub struct SessionRegistry {
    entries: RwLock<HashMap<SessionKey, SessionHandle>>,
    /// Serializes starts: path allocation and archive creation.
    start_lock: Mutex<()>,
    claims: PathClaims,
    naming: NamingPolicy,
    root: PathBuf,
    partition: RwLock<NaiveDate>,
    clock: Arc<dyn Clock>,
    context: ArchiveContext,
}

impl SessionRegistry {
    /// Create a registry whose day partition is the clock's current date.
    pub fn new(options: RegistryOptions, clock: Arc<dyn Clock>) -> Self {
        let today = clock.today();
        // Claims are keyed by absolute path; keep ours comparable.
        let root = std::env::current_dir()
            .map(|cwd| cwd.join(&options.root))
            .unwrap_or(options.root);
        Self {
            entries: RwLock::new(HashMap::new()),
            start_lock: Mutex::new(()),
            claims: PathClaims::new(),
            naming: NamingPolicy::new(options.extension),
            root,
            partition: RwLock::new(today),
            clock,
            context: options.context,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn naming(&self) -> &NamingPolicy {
        &self.naming
    }

    pub fn claims(&self) -> &PathClaims {
        &self.claims
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn context(&self) -> &ArchiveContext {
        &self.context
    }

    /// Current day partition date.
    pub fn partition(&self) -> NaiveDate {
        *self.partition.read()
    }

    /// Advance the day partition. New sessions land in the new directory.
    pub fn set_partition(&self, date: NaiveDate) {
        *self.partition.write() = date;
    }

    /// Directory of the current day partition.
    pub fn partition_dir(&self) -> PathBuf {
        day_partition(&self.root, self.partition())
    }

    /// Start a session under the current day partition.
    pub fn start_session(&self, key: SessionKey, subject: Arc<dyn Subject>) -> Result<SessionHandle> {
        self.start_session_in(key, subject, None)
    }

    /// Start a session, optionally in a specific directory instead of the
    /// current day partition.
    ///
    /// Fails with `AlreadyRecording` if the key is taken and with
    /// `SubjectUnavailable` if the subject is offline.
    pub fn start_session_in(
        &self,
        key: SessionKey,
        subject: Arc<dyn Subject>,
        dir: Option<&Path>,
    ) -> Result<SessionHandle> {
        if !subject.is_online() {
            return Err(RecorderError::SubjectUnavailable(key));
        }

        let _guard = self.start_lock.lock();
        if self.entries.read().contains_key(&key) {
            return Err(RecorderError::AlreadyRecording(key));
        }

        let base_dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => self.partition_dir(),
        };
        let path = self
            .naming
            .next_path(&base_dir, subject.name(), self.clock.now())?;

        let session = Arc::new(Session::new(
            key.clone(),
            subject,
            path,
            Arc::clone(&self.clock),
            self.context.clone(),
        ));
        session.begin(&self.claims)?;

        // Inserts only happen under `start_lock`, so the key is still free.
        self.entries.write().insert(key.clone(), Arc::clone(&session));

        info!(
            key = %key,
            subject = %session.subject_name(),
            path = %session.output_path().display(),
            "Recording started"
        );
        Ok(session)
    }

    /// Stop a session, seal its archive and return the archive path.
    pub fn stop_session(&self, key: &SessionKey) -> Result<PathBuf> {
        let (session, pending) = {
            let mut entries = self.entries.write();
            let session = entries
                .remove(key)
                .ok_or_else(|| RecorderError::NotRecording(key.clone()))?;
            let pending = session.begin_finalize()?;
            (session, pending)
        };

        match session.complete_finalize(pending) {
            Ok(path) => {
                info!(key = %key, path = %path.display(), "Recording saved");
                Ok(path)
            }
            Err(e) => {
                error!(key = %key, error = %e, "Recording failed to seal");
                Err(e)
            }
        }
    }

    /// Stop every active session independently. A failure on one key does
    /// not prevent the others from stopping.
    pub fn stop_all(&self) -> Vec<(SessionKey, Result<PathBuf>)> {
        self.list_active()
            .into_iter()
            .map(|key| {
                let result = self.stop_session(&key);
                (key, result)
            })
            .collect()
    }

    /// Stop a session on the blocking pool. The handle resolves once the
    /// archive is sealed.
    pub fn stop_session_detached(self: &Arc<Self>, key: SessionKey) -> JoinHandle<Result<PathBuf>> {
        let registry = Arc::clone(self);
        tokio::task::spawn_blocking(move || registry.stop_session(&key))
    }

    /// Stop every active session concurrently and wait for all of them.
    pub async fn stop_all_async(self: &Arc<Self>) -> Vec<(SessionKey, Result<PathBuf>)> {
        let keys = self.list_active();
        let handles: Vec<_> = keys
            .iter()
            .cloned()
            .map(|key| self.stop_session_detached(key))
            .collect();

        let results = join_all(handles).await;
        keys.into_iter()
            .zip(results)
            .map(|(key, joined)| {
                let result = joined.unwrap_or_else(|e| {
                    warn!(key = %key, error = %e, "Stop task did not complete");
                    Err(RecorderError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        e.to_string(),
                    )))
                });
                (key, result)
            })
            .collect()
    }

    /// Look up a live session.
    pub fn get(&self, key: &SessionKey) -> Option<SessionHandle> {
        self.entries.read().get(key).cloned()
    }

    pub fn is_active(&self, key: &SessionKey) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Snapshot of active keys, sorted.
    pub fn list_active(&self) -> Vec<SessionKey> {
        let mut keys: Vec<SessionKey> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Snapshot of active sessions, sorted by key.
    pub fn sessions(&self) -> Vec<SessionHandle> {
        let mut sessions: Vec<SessionHandle> = self.entries.read().values().cloned().collect();
        sessions.sort_by(|a, b| a.key().cmp(b.key()));
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{hold_read_lock, TestSubject};
    use reelhouse_archive::Archive;
    use reelhouse_core::{ManualClock, SessionState};
    use tempfile::TempDir;

    fn registry(tmp: &TempDir) -> SessionRegistry {
        let clock = ManualClock::at(2024, 5, 17, 12, 0, 0);
        SessionRegistry::new(RegistryOptions::new(tmp.path()), Arc::new(clock))
    }

    #[test]
    fn test_start_places_archive_in_partition() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let subject = TestSubject::online("alice");
        let key = SessionKey::Subject(subject.id());

        let session = reg.start_session(key.clone(), subject).unwrap();
        assert_eq!(
            session.output_path(),
            tmp.path().join("2024_05_17").join("alice_12-00-00_1.mcpr")
        );
        assert_eq!(session.state(), SessionState::Recording);
        assert!(reg.is_active(&key));
        assert_eq!(reg.active_count(), 1);
    }

    #[test]
    fn test_duplicate_start_rejected() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let subject = TestSubject::online("alice");
        let key = SessionKey::Subject(subject.id());

        reg.start_session(key.clone(), subject.clone()).unwrap();
        let err = reg.start_session(key, subject).unwrap_err();
        assert!(matches!(err, RecorderError::AlreadyRecording(_)));
        assert_eq!(reg.active_count(), 1);
    }

    #[test]
    fn test_offline_subject_unavailable() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let subject = TestSubject::offline("ghost");
        let err = reg
            .start_session(SessionKey::Subject(subject.id()), subject)
            .unwrap_err();
        assert!(matches!(err, RecorderError::SubjectUnavailable(_)));
        assert_eq!(reg.active_count(), 0);
    }

    #[test]
    fn test_stop_unknown_key_has_no_side_effects() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let err = reg
            .stop_session(&SessionKey::Custom("nobody".to_string()))
            .unwrap_err();
        assert!(matches!(err, RecorderError::NotRecording(_)));
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_stop_removes_and_seals() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let subject = TestSubject::online("alice");
        let key = SessionKey::Subject(subject.id());

        let session = reg.start_session(key.clone(), subject).unwrap();
        session.record_event(b"x".to_vec());
        let path = reg.stop_session(&key).unwrap();

        assert!(!reg.is_active(&key));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(reg.claims().is_empty());
        assert_eq!(Archive::open(path).unwrap().events.len(), 1);
    }

    #[test]
    fn test_same_name_different_keys_get_distinct_paths() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let a = reg
            .start_session(SessionKey::Custom("cam-one".into()), TestSubject::online("alice"))
            .unwrap();
        let b = reg
            .start_session(SessionKey::Custom("cam-two".into()), TestSubject::online("alice"))
            .unwrap();
        assert_ne!(a.output_path(), b.output_path());
        assert!(b.output_path().ends_with("alice_12-00-00_2.mcpr"));
    }

    #[test]
    fn test_stop_all_isolates_failures() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let keys: Vec<SessionKey> = ["cam-one", "cam-two", "cam-three"]
            .iter()
            .map(|l| SessionKey::Custom(l.to_string()))
            .collect();
        for key in &keys {
            reg.start_session(key.clone(), TestSubject::online("alice")).unwrap();
        }
        let stuck = reg.get(&keys[1]).unwrap();
        let reader = hold_read_lock(stuck.output_path());

        let results = reg.stop_all();
        drop(reader);

        assert_eq!(results.len(), 3);
        let failed: Vec<&SessionKey> = results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(k, _)| k)
            .collect();
        assert_eq!(failed, vec![&keys[1]]);
        assert_eq!(stuck.state(), SessionState::Failed);
        assert!(stuck.output_path().exists());
        assert_eq!(reg.active_count(), 0);
        assert!(reg.claims().is_empty());
    }

    #[test]
    fn test_lookups_only_see_recording_sessions() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        let ok = SessionKey::Custom("cam-one".into());
        let bad = SessionKey::Custom("cam-two".into());
        reg.start_session(ok.clone(), TestSubject::online("alice")).unwrap();
        let failing = reg.start_session(bad.clone(), TestSubject::online("bob")).unwrap();

        let all_recording = |reg: &SessionRegistry| {
            reg.sessions()
                .iter()
                .all(|s| s.state() == SessionState::Recording)
        };
        assert!(all_recording(&reg));

        let reader = hold_read_lock(failing.output_path());
        assert!(reg.stop_session(&bad).is_err());
        drop(reader);
        assert!(!reg.is_active(&bad));
        assert!(reg.get(&bad).is_none());
        assert!(all_recording(&reg));

        reg.stop_session(&ok).unwrap();
        assert!(reg.get(&ok).is_none());
        assert_eq!(reg.active_count(), 0);

        // The key is free again after a failed seal.
        let again = reg.start_session(bad, TestSubject::online("bob")).unwrap();
        assert_eq!(again.state(), SessionState::Recording);
    }

    #[tokio::test]
    async fn test_stop_all_async_waits_for_all() {
        let tmp = TempDir::new().unwrap();
        let reg = Arc::new(registry(&tmp));
        for label in ["cam-one", "cam-two"] {
            reg.start_session(SessionKey::Custom(label.into()), TestSubject::online(label))
                .unwrap();
        }
        let results = reg.stop_all_async().await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(reg.active_count(), 0);
    }

    #[tokio::test]
    async fn test_detached_stop_signals_completion() {
        let tmp = TempDir::new().unwrap();
        let reg = Arc::new(registry(&tmp));
        let key = SessionKey::Custom("cam-one".into());
        reg.start_session(key.clone(), TestSubject::online("alice")).unwrap();

        let path = reg.stop_session_detached(key.clone()).await.unwrap().unwrap();
        assert!(path.exists());
        assert!(!reg.is_active(&key));
    }
}
