//! A single recording session.
//!
//! A session moves through `Created -> Recording -> Finalizing -> Closed`,
//! or to `Failed` on an I/O error. Events are buffered in memory while
//! recording and written to the archive when the session is finalized.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::{debug, warn};

use reelhouse_archive::{ArchiveMetadata, ArchiveWriter, PathClaims};
use reelhouse_core::{CaptureEvent, Clock, Marker, SessionKey, SessionState, Subject};

use crate::error::{RecorderError, Result};

/// Fixed metadata shared by every archive a registry writes.
#[derive(Debug, Clone)]
pub struct ArchiveContext {
    pub server_name: String,
    pub protocol_version: u32,
    pub host_version: String,
}

impl Default for ArchiveContext {
    fn default() -> Self {
        Self {
            server_name: "localhost".to_string(),
            protocol_version: 0,
            host_version: "unknown".to_string(),
        }
    }
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    events: Vec<CaptureEvent>,
    markers: Vec<Marker>,
    /// Highest offset handed out; offsets never go backwards.
    last_offset: u32,
    ended_at: Option<DateTime<Local>>,
}

/// Events and markers taken out of a session when finalizing starts.
#[derive(Debug)]
pub(crate) struct PendingSeal {
    events: Vec<CaptureEvent>,
    markers: Vec<Marker>,
    ended_at: DateTime<Local>,
}

/// One subject's recording.
pub struct Session {
    key: SessionKey,
    subject: Arc<dyn Subject>,
    subject_name: String,
    output_path: PathBuf,
    started_at: DateTime<Local>,
    clock: Arc<dyn Clock>,
    context: ArchiveContext,
    inner: Mutex<SessionInner>,
    writer: Mutex<Option<ArchiveWriter>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("subject_name", &self.subject_name)
            .field("output_path", &self.output_path)
            .field("state", &self.state())
            .finish()
    }
}

/// Milliseconds from `from` to `to`, clamped into `u32`.
fn offset_between(from: DateTime<Local>, to: DateTime<Local>) -> u32 {
    let ms = (to - from).num_milliseconds();
    ms.clamp(0, u32::MAX as i64) as u32
}

impl Session {
    /// Create a session in the `Created` state. Nothing is written yet.
    pub(crate) fn new(
        key: SessionKey,
        subject: Arc<dyn Subject>,
        output_path: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
        context: ArchiveContext,
    ) -> Self {
        let started_at = clock.now();
        let subject_name = subject.name().to_string();
        Self {
            key,
            subject,
            subject_name,
            output_path: output_path.into(),
            started_at,
            clock,
            context,
            inner: Mutex::new(SessionInner {
                state: SessionState::Created,
                events: Vec::new(),
                markers: vec![Marker::new("start", 0)],
                last_offset: 0,
                ended_at: None,
            }),
            writer: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn subject(&self) -> &Arc<dyn Subject> {
        &self.subject
    }

    /// Subject name as it was when the session was created.
    pub fn subject_name(&self) -> &str {
        &self.subject_name
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Local>> {
        self.inner.lock().ended_at
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Number of buffered events.
    pub fn event_count(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Whether the recorded subject is still connected.
    pub fn subject_online(&self) -> bool {
        self.subject.is_online()
    }

    fn metadata(&self) -> ArchiveMetadata {
        ArchiveMetadata::new(
            &self.context.server_name,
            &self.subject_name,
            self.key.to_string(),
            self.started_at.timestamp_millis(),
        )
        .with_protocol(self.context.protocol_version, &self.context.host_version)
    }

    /// Open the archive and start recording.
    ///
    /// On failure the session moves to `Failed` and the error is returned.
    pub(crate) fn begin(&self, claims: &PathClaims) -> Result<()> {
        {
            let inner = self.inner.lock();
            if inner.state != SessionState::Created {
                return Err(RecorderError::NotRecording(self.key.clone()));
            }
        }

        let opened = ArchiveWriter::open(&self.output_path, claims).and_then(|mut writer| {
            writer.write_metadata(&self.metadata())?;
            Ok(writer)
        });

        match opened {
            Ok(writer) => {
                *self.writer.lock() = Some(writer);
                self.inner.lock().state = SessionState::Recording;
                debug!(key = %self.key, path = %self.output_path.display(), "Session recording");
                Ok(())
            }
            Err(e) => {
                self.inner.lock().state = SessionState::Failed;
                Err(e.into())
            }
        }
    }

    fn next_offset(&self, inner: &mut SessionInner) -> u32 {
        let offset = offset_between(self.started_at, self.clock.now()).max(inner.last_offset);
        inner.last_offset = offset;
        offset
    }

    /// Append an event. Returns `false` if the session is no longer
    /// recording, in which case the event is dropped.
    pub fn record_event(&self, payload: impl Into<Vec<u8>>) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Recording {
            return false;
        }
        let offset = self.next_offset(&mut inner);
        inner.events.push(CaptureEvent::new(offset, payload));
        true
    }

    /// Add a named marker at the current offset.
    pub fn add_marker(&self, name: impl Into<String>) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Recording {
            return false;
        }
        let offset = self.next_offset(&mut inner);
        inner.markers.push(Marker::new(name, offset));
        true
    }

    /// Clone the events captured within the last `window` of the session,
    /// rebased so the first returned event sits at the window start.
    ///
    /// Returns the events and the wall-clock time the window starts at.
    pub fn snapshot_window(&self, window: chrono::Duration) -> (Vec<CaptureEvent>, DateTime<Local>) {
        let inner = self.inner.lock();
        let now = offset_between(self.started_at, self.clock.now()).max(inner.last_offset);
        let window_ms = window.num_milliseconds().clamp(0, u32::MAX as i64) as u32;
        let from = now.saturating_sub(window_ms);
        let events = inner
            .events
            .iter()
            .filter(|e| e.offset_ms >= from)
            .map(|e| CaptureEvent::new(e.offset_ms - from, e.payload.clone()))
            .collect();
        let window_start = self.started_at + chrono::Duration::milliseconds(from as i64);
        (events, window_start)
    }

    /// First half of finalizing: move to `Finalizing` and take the buffers.
    ///
    /// Cheap and non-blocking, so the registry can run it while removing
    /// the entry.
    pub(crate) fn begin_finalize(&self) -> Result<PendingSeal> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Recording {
            return Err(RecorderError::NotRecording(self.key.clone()));
        }
        inner.state = SessionState::Finalizing;
        let ended_at = self.clock.now();
        inner.ended_at = Some(ended_at);
        Ok(PendingSeal {
            events: std::mem::take(&mut inner.events),
            markers: std::mem::take(&mut inner.markers),
            ended_at,
        })
    }

    /// Second half of finalizing: write everything and seal the archive.
    pub(crate) fn complete_finalize(&self, pending: PendingSeal) -> Result<PathBuf> {
        let writer = self.writer.lock().take();
        let Some(mut writer) = writer else {
            self.inner.lock().state = SessionState::Failed;
            return Err(RecorderError::NotRecording(self.key.clone()));
        };

        let final_meta = self.metadata().finalized(pending.ended_at.timestamp_millis());
        let sealed = writer
            .append_events(&pending.events)
            .and_then(|_| writer.seal(&final_meta, &pending.markers));

        match sealed {
            Ok(path) => {
                self.inner.lock().state = SessionState::Closed;
                debug!(
                    key = %self.key,
                    events = pending.events.len(),
                    duration = final_meta.duration,
                    "Session closed"
                );
                Ok(path)
            }
            Err(e) => {
                self.inner.lock().state = SessionState::Failed;
                warn!(
                    key = %self.key,
                    path = %self.output_path.display(),
                    error = %e,
                    "Failed to seal archive; leaving it in place"
                );
                Err(e.into())
            }
        }
    }

    /// Both halves of finalizing, for sessions outside a registry.
    #[cfg(test)]
    pub(crate) fn finalize(&self) -> Result<PathBuf> {
        let pending = self.begin_finalize()?;
        self.complete_finalize(pending)
    }
}
