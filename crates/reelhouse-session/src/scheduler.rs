//! Midnight rotation and the periodic retention sweep.
//!
//! Both run as tokio tasks that stop when their [`CancellationToken`] is
//! cancelled. The blocking work (sealing archives, deleting files) runs on
//! the blocking pool so timers are never held up by disk I/O.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reelhouse_core::clock::until_midnight;
use reelhouse_core::{Clock, RecordingFilter, SessionKey, Subject};

use crate::error::RecorderError;
use crate::registry::SessionRegistry;
use crate::retention::{RetentionSweep, SweepReport};

/// What a rotation did to each session.
#[derive(Debug, Default)]
pub struct RotationReport {
    /// Archives sealed under the previous partition
    pub sealed: Vec<(SessionKey, PathBuf)>,
    /// Sessions whose stop failed; their archives are left for inspection
    pub failed_stops: Vec<(SessionKey, String)>,
    /// Sessions started again under the new partition
    pub restarted: Vec<SessionKey>,
    /// Sessions not restarted because their subject is gone or filtered
    pub dropped: Vec<SessionKey>,
    /// Sessions whose restart failed
    pub failed_restarts: Vec<(SessionKey, String)>,
}

/// Whether a rotated session should be started again.
fn still_eligible(key: &SessionKey, subject: &dyn Subject, filter: &RecordingFilter) -> bool {
    subject.is_online() && (key.is_custom() || filter.should_record(subject))
}

/// Move the registry to `new_date`: stop every active session and restart
/// the eligible ones under the new day partition.
///
/// Every stop and start is individually atomic, so the registry stays
/// consistent however far a rotation gets.
pub fn rotate(registry: &SessionRegistry, filter: &RecordingFilter, new_date: NaiveDate) -> RotationReport {
    let mut report = RotationReport::default();

    let subjects: HashMap<SessionKey, Arc<dyn Subject>> = registry
        .sessions()
        .into_iter()
        .map(|s| (s.key().clone(), Arc::clone(s.subject())))
        .collect();

    registry.set_partition(new_date);

    let mut keys: Vec<SessionKey> = subjects.keys().cloned().collect();
    keys.sort();
    for key in keys {
        match registry.stop_session(&key) {
            Ok(path) => report.sealed.push((key.clone(), path)),
            // Stopped by someone else in the meantime; leave it stopped.
            Err(RecorderError::NotRecording(_)) => {
                report.dropped.push(key);
                continue;
            }
            Err(e) => report.failed_stops.push((key.clone(), e.to_string())),
        }

        let Some(subject) = subjects.get(&key) else {
            continue;
        };
        if !still_eligible(&key, subject.as_ref(), filter) {
            debug!(key = %key, "Not restarting session after rotation");
            report.dropped.push(key);
            continue;
        }

        match registry.start_session(key.clone(), Arc::clone(subject)) {
            Ok(_) => report.restarted.push(key),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to restart session after rotation");
                report.failed_restarts.push((key, e.to_string()));
            }
        }
    }

    info!(
        date = %new_date,
        sealed = report.sealed.len(),
        restarted = report.restarted.len(),
        dropped = report.dropped.len(),
        failed = report.failed_stops.len() + report.failed_restarts.len(),
        "Day rotation finished"
    );
    report
}

/// Spawn the midnight rotation loop.
///
/// Sleeps until the next local midnight, then rotates to the clock's new
/// date. If the clock is already past the current partition when the loop
/// wakes (or starts), it rotates immediately.
pub fn spawn_rotation_task(
    registry: Arc<SessionRegistry>,
    filter: Arc<RecordingFilter>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let today = registry.clock().today();
            if today > registry.partition() {
                let reg = Arc::clone(&registry);
                let filter = Arc::clone(&filter);
                let rotated = tokio::task::spawn_blocking(move || rotate(&reg, &filter, today)).await;
                if let Err(e) = rotated {
                    warn!(error = %e, "Rotation task panicked");
                }
                continue;
            }

            let wait = until_midnight(registry.clock().now()).max(Duration::from_millis(100));
            debug!(wait_secs = wait.as_secs(), "Waiting for next day rotation");

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Rotation task shutting down");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    })
}

/// Spawn the retention loop. The first sweep runs immediately, then once
/// per `interval`.
pub fn spawn_retention_task(
    sweeps: Vec<RetentionSweep>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let sweeps = Arc::new(sweeps);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Retention task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let sweeps = Arc::clone(&sweeps);
                    let swept = tokio::task::spawn_blocking(move || run_sweeps(&sweeps, SystemTime::now())).await;
                    if let Err(e) = swept {
                        warn!(error = %e, "Retention sweep panicked");
                    }
                }
            }
        }
    })
}

/// Run each sweep in turn and combine the reports.
pub fn run_sweeps(sweeps: &[RetentionSweep], now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();
    for sweep in sweeps {
        report.merge(sweep.sweep(now));
    }
    report
}
