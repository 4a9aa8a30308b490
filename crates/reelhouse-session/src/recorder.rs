//! Collaborator-facing recorder.
//!
//! [`Recorder`] owns one [`SessionRegistry`] plus its background timers and
//! exposes the small boolean/optional API that command handlers and event
//! hooks call into. Errors are logged and reported to the
//! [`RecordingEventHandler`] rather than propagated.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reelhouse_core::config::OfflinePolicy;
use reelhouse_core::{Clock, Config, RecordingFilter, SessionKey, Subject};

use crate::error::{RecorderError, Result};
use crate::registry::{RegistryOptions, SessionHandle, SessionRegistry};
use crate::retention::{remove_orphan_journals, RetentionSweep};
use crate::scheduler::{spawn_retention_task, spawn_rotation_task};

/// Longest gap between instant replay expiry checks.
const REPLAY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Cap on the configured retention interval.
const MAX_RETENTION_INTERVAL_HOURS: u64 = 24 * 366;

/// Handler for recording notifications.
///
/// Implement this trait to tell operators when recordings start and stop.
/// Delivery (chat, action bar, ...) is up to the host.
pub trait RecordingEventHandler: Send + Sync {
    /// Called when a session starts recording.
    fn on_started(&self, _key: &SessionKey, _subject_name: &str) {}

    /// Called when a session's archive is sealed.
    fn on_stopped(&self, _key: &SessionKey, _file_name: &str) {}

    /// Called when a start or stop fails unexpectedly.
    fn on_failed(&self, _key: &SessionKey, _error: &RecorderError) {}
}

/// Handler that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl RecordingEventHandler for NoopHandler {}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn report_stop(handler: Option<&dyn RecordingEventHandler>, key: &SessionKey, result: &Result<PathBuf>) {
    match result {
        Ok(path) => {
            if let Some(handler) = handler {
                handler.on_stopped(key, &file_name(path));
            }
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to stop recording");
            if let Some(handler) = handler {
                handler.on_failed(key, e);
            }
        }
    }
}

/// The recording core as seen by the host.
pub struct Recorder {
    config: Config,
    registry: Arc<SessionRegistry>,
    filter: Arc<RecordingFilter>,
    handler: Arc<dyn RecordingEventHandler>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Recorder {
    /// Build a recorder without starting any background task.
    pub fn new(config: Config, clock: Arc<dyn Clock>, handler: Arc<dyn RecordingEventHandler>) -> Self {
        let registry = Arc::new(SessionRegistry::new(RegistryOptions::from_config(&config), clock));
        let filter = Arc::new(RecordingFilter::from_config(&config.filter));
        Self {
            config,
            registry,
            filter,
            handler,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Build a recorder, clear journals left by a previous crash and spawn
    /// the rotation and retention tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn init(config: Config, clock: Arc<dyn Clock>, handler: Arc<dyn RecordingEventHandler>) -> Self {
        let recorder = Self::new(config, clock, handler);
        recorder.remove_orphan_journals();
        recorder.spawn_timers();
        recorder
    }

    /// Delete journals whose archive is gone, under the recording root and
    /// the instant replay directory.
    pub fn remove_orphan_journals(&self) -> Vec<PathBuf> {
        let extension = &self.config.recording.extension;
        let mut removed = remove_orphan_journals(self.registry.root(), extension);
        if self.config.instant_replay.enabled {
            removed.extend(remove_orphan_journals(&self.config.instant_replay.dir, extension));
        }
        removed
    }

    fn spawn_timers(&self) {
        let mut tasks = self.tasks.lock();
        tasks.push(spawn_rotation_task(
            Arc::clone(&self.registry),
            Arc::clone(&self.filter),
            self.cancel.child_token(),
        ));

        for (interval, sweeps) in self.sweep_schedule() {
            tasks.push(spawn_retention_task(sweeps, interval, self.cancel.child_token()));
        }
        info!(
            root = %self.registry.root().display(),
            partition = %self.registry.partition(),
            "Recorder initialized"
        );
    }

    /// Every sweep the retention tasks run, per configuration.
    pub fn retention_sweeps(&self) -> Vec<RetentionSweep> {
        self.sweep_schedule()
            .into_iter()
            .flat_map(|(_, sweeps)| sweeps)
            .collect()
    }

    /// Sweeps grouped by how often they run. Recordings are swept every
    /// `retention.interval_hours`; instant replays at least once a minute
    /// so they expire close to `expire_minutes`.
    pub fn sweep_schedule(&self) -> Vec<(Duration, Vec<RetentionSweep>)> {
        let mut schedule = Vec::new();
        let extension = &self.config.recording.extension;
        let claims = self.registry.claims();

        let retention = &self.config.retention;
        if retention.auto_cleanup {
            if let Some(sweep) = RetentionSweep::days(self.registry.root(), extension, retention.days) {
                let hours = retention.interval_hours.clamp(1, MAX_RETENTION_INTERVAL_HOURS);
                let interval = Duration::from_secs(hours.saturating_mul(3600));
                schedule.push((interval, vec![sweep.with_claims(claims.clone())]));
            }
        }

        let replay = &self.config.instant_replay;
        if replay.enabled && replay.expire_minutes > 0 {
            let max_age = Duration::from_secs(u64::from(replay.expire_minutes) * 60);
            let sweep = RetentionSweep::new(&replay.dir, extension, max_age).with_claims(claims.clone());
            schedule.push((REPLAY_SWEEP_INTERVAL.min(max_age), vec![sweep]));
        }
        schedule
    }

    /// Cancel the timers and stop every session, waiting for all archives
    /// to be sealed.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        let results = self.registry.stop_all_async().await;
        for (key, result) in &results {
            report_stop(self.notify(), key, result);
        }
        info!(stopped = results.len(), "Recorder shut down");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    fn notify(&self) -> Option<&dyn RecordingEventHandler> {
        self.config
            .notifications
            .enabled
            .then(|| self.handler.as_ref())
    }

    /// Start recording `subject` under `key`.
    ///
    /// Subject keys go through the recording filter; custom keys must carry
    /// a valid label. Returns `false` if the session was not started.
    pub fn start_session(&self, key: SessionKey, subject: Arc<dyn Subject>) -> bool {
        match self.try_start(key.clone(), subject) {
            Ok(session) => {
                if let Some(handler) = self.notify() {
                    handler.on_started(&key, session.subject_name());
                }
                true
            }
            Err(e) if e.is_expected() => {
                debug!(key = %key, reason = %e, "Session not started");
                false
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to start recording");
                if let Some(handler) = self.notify() {
                    handler.on_failed(&key, &e);
                }
                false
            }
        }
    }

    fn try_start(&self, key: SessionKey, subject: Arc<dyn Subject>) -> Result<SessionHandle> {
        match &key {
            SessionKey::Custom(label) => {
                reelhouse_core::session::validate_label(
                    label,
                    self.config.recording.custom_label_min,
                    self.config.recording.custom_label_max,
                )?;
            }
            SessionKey::Subject(_) => {
                if !self.filter.should_record(subject.as_ref()) {
                    return Err(RecorderError::Filtered(key));
                }
            }
        }
        self.registry.start_session(key, subject)
    }

    /// Stop the session under `key`. Returns the sealed archive's file name.
    pub fn stop_session(&self, key: &SessionKey) -> Option<String> {
        let result = self.registry.stop_session(key);
        match &result {
            Err(RecorderError::NotRecording(_)) => None,
            _ => {
                report_stop(self.notify(), key, &result);
                result.ok().map(|p| file_name(&p))
            }
        }
    }

    /// Stop a session without blocking the caller. The returned handle
    /// resolves once the archive is sealed and the handler has been told.
    pub fn stop_session_detached(&self, key: SessionKey) -> JoinHandle<Result<PathBuf>> {
        let registry = Arc::clone(&self.registry);
        let handler = self
            .config
            .notifications
            .enabled
            .then(|| Arc::clone(&self.handler));
        tokio::task::spawn_blocking(move || {
            let result = registry.stop_session(&key);
            if !matches!(result, Err(RecorderError::NotRecording(_))) {
                report_stop(handler.as_deref(), &key, &result);
            }
            result
        })
    }

    /// Stop every active session. Failures are isolated per key.
    pub fn stop_all_sessions(&self) -> usize {
        let results = self.registry.stop_all();
        for (key, result) in &results {
            report_stop(self.notify(), key, result);
        }
        results.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn is_active(&self, key: &SessionKey) -> bool {
        self.registry.is_active(key)
    }

    pub fn active_count(&self) -> usize {
        self.registry.active_count()
    }

    pub fn list_active(&self) -> Vec<SessionKey> {
        self.registry.list_active()
    }

    /// Feed one capture event. Returns `false` if nothing is recording
    /// under `key` or the session is closing.
    pub fn record_event(&self, key: &SessionKey, payload: impl Into<Vec<u8>>) -> bool {
        self.registry
            .get(key)
            .map(|s| s.record_event(payload))
            .unwrap_or(false)
    }

    /// Add a named marker to the session under `key`.
    pub fn add_marker(&self, key: &SessionKey, name: impl Into<String>) -> bool {
        self.registry
            .get(key)
            .map(|s| s.add_marker(name))
            .unwrap_or(false)
    }

    /// Called by the host when the subject behind `key` disconnects.
    ///
    /// With the `stop` policy the session is sealed and its file name
    /// returned; with `keep` it continues buffering.
    pub fn subject_offline(&self, key: &SessionKey) -> Option<String> {
        if !self.registry.is_active(key) {
            return None;
        }
        match self.config.session.on_subject_offline {
            OfflinePolicy::Keep => {
                debug!(key = %key, "Subject offline; session kept");
                None
            }
            OfflinePolicy::Stop => {
                info!(key = %key, "Subject offline; stopping session");
                self.stop_session(key)
            }
        }
    }

    /// Save the last `replay_minutes` of the session under `key` as an
    /// instant replay.
    pub fn save_instant_replay(&self, key: &SessionKey) -> Result<PathBuf> {
        let replay = &self.config.instant_replay;
        if !replay.enabled {
            return Err(reelhouse_core::Error::Validation(
                "instant replay is disabled".to_string(),
            )
            .into());
        }
        let window = chrono::Duration::minutes(replay.replay_minutes as i64);
        self.registry.save_instant_replay(key, &replay.dir, window)
    }
}
