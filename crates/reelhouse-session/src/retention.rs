//! Retention sweep: deletes archives older than a configured age.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use reelhouse_archive::{catalog, PathClaims};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Outcome of one sweep.
#[derive(Debug, Default, Clone)]
pub struct SweepReport {
    /// Archives deleted (or that would be, on a dry run)
    pub deleted: Vec<PathBuf>,
    /// Archives whose deletion failed
    pub failed: Vec<(PathBuf, String)>,
    /// Archives young enough to keep, or still being written
    pub kept: usize,
}

impl SweepReport {
    pub fn merge(&mut self, other: SweepReport) {
        self.deleted.extend(other.deleted);
        self.failed.extend(other.failed);
        self.kept += other.kept;
    }
}

/// A sweep over one directory tree.
#[derive(Debug, Clone)]
pub struct RetentionSweep {
    root: PathBuf,
    extension: String,
    max_age: Duration,
    claims: Option<PathClaims>,
    dry_run: bool,
}

impl RetentionSweep {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>, max_age: Duration) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            max_age,
            claims: None,
            dry_run: false,
        }
    }

    /// A sweep deleting archives older than `days` days, or `None` when
    /// `days <= 0` disables retention.
    pub fn days(root: impl Into<PathBuf>, extension: impl Into<String>, days: i64) -> Option<Self> {
        if days <= 0 {
            return None;
        }
        let max_age = Duration::from_secs((days as u64).saturating_mul(SECS_PER_DAY));
        Some(Self::new(root, extension, max_age))
    }

    /// Never delete paths that currently have an open writer.
    pub fn with_claims(mut self, claims: PathClaims) -> Self {
        self.claims = Some(claims);
        self
    }

    /// Report what would be deleted without touching the filesystem.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Delete every archive last modified before `now - max_age`.
    ///
    /// A failed deletion is logged and recorded; the sweep continues.
    pub fn sweep(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();
        // No cutoff when the age reaches back before the epoch.
        let cutoff = now.checked_sub(self.max_age);

        for entry in catalog::scan(&self.root, &self.extension) {
            let in_use = self
                .claims
                .as_ref()
                .map(|c| c.is_claimed(&entry.path))
                .unwrap_or(false);
            let expired = cutoff.map(|c| entry.modified < c).unwrap_or(false);
            if in_use || !expired {
                report.kept += 1;
                continue;
            }

            if self.dry_run {
                report.deleted.push(entry.path);
                continue;
            }

            match std::fs::remove_file(&entry.path) {
                Ok(()) => {
                    debug!(path = %entry.path.display(), "Deleted expired archive");
                    remove_journal(&catalog::journal_path(&entry.path));
                    report.deleted.push(entry.path);
                }
                Err(e) => {
                    warn!(path = %entry.path.display(), error = %e, "Failed to delete expired archive");
                    report.failed.push((entry.path, e.to_string()));
                }
            }
        }

        if !report.deleted.is_empty() || !report.failed.is_empty() {
            info!(
                root = %self.root.display(),
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                dry_run = self.dry_run,
                "Retention sweep finished"
            );
        }
        report
    }
}

/// Remove a leftover journal. A missing journal is the normal case.
fn remove_journal(journal: &Path) -> bool {
    match std::fs::remove_file(journal) {
        Ok(()) => {
            debug!(path = %journal.display(), "Deleted archive journal");
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %journal.display(), error = %e, "Failed to delete archive journal");
            false
        }
    }
}

/// Delete journals left under `root` by writers that crashed after their
/// archive was removed.
///
/// Returns the journals that were deleted.
pub fn remove_orphan_journals(root: &Path, extension: &str) -> Vec<PathBuf> {
    let removed: Vec<PathBuf> = catalog::orphan_journals(root, extension)
        .into_iter()
        .filter(|journal| remove_journal(journal))
        .collect();
    if !removed.is_empty() {
        info!(root = %root.display(), removed = removed.len(), "Removed orphaned journals");
    }
    removed
}
