//! Archive writer.
//!
//! An archive is a single SQLite file whose `members` table holds the
//! logical members (`metadata`, `events`, `markers`). Everything a session
//! writes happens inside one transaction that is opened with the file and
//! committed by [`ArchiveWriter::seal`], so a crash before sealing leaves a
//! file without a committed metadata member, which readers reject as corrupt.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::debug;

use reelhouse_core::{CaptureEvent, Marker};

use crate::error::{ArchiveError, Result};
use crate::format::{encode_events, ArchiveMetadata, EVENTS_MEMBER, MARKERS_MEMBER, METADATA_MEMBER};

/// Set of archive paths that currently have an open writer.
///
/// Cheap to clone; clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct PathClaims {
    inner: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PathClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a path exclusively. Fails if it is already claimed.
    fn claim(&self, path: &Path) -> Result<ClaimGuard> {
        let mut claimed = self.inner.lock();
        if !claimed.insert(path.to_path_buf()) {
            return Err(ArchiveError::PathConflict(path.to_path_buf()));
        }
        Ok(ClaimGuard {
            claims: self.clone(),
            path: path.to_path_buf(),
        })
    }

    /// Whether the path is currently claimed.
    pub fn is_claimed(&self, path: &Path) -> bool {
        self.inner.lock().contains(path)
    }

    /// Number of open writers.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases a path claim when dropped.
#[derive(Debug)]
struct ClaimGuard {
    claims: PathClaims,
    path: PathBuf,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.claims.inner.lock().remove(&self.path);
    }
}

/// Make a path absolute without requiring it to exist.
fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// An open archive accepting writes until sealed.
///
/// Dropping a writer without sealing rolls back the pending transaction and
/// leaves the file in place without committed metadata.
#[derive(Debug)]
pub struct ArchiveWriter {
    conn: Connection,
    path: PathBuf,
    next_event_part: i64,
    _claim: ClaimGuard,
}

impl ArchiveWriter {
    /// Create and open a new archive at `path`.
    ///
    /// Parent directories are created as needed. Fails with
    /// [`ArchiveError::PathConflict`] if another writer holds the path or a
    /// file already exists there.
    pub fn open(path: impl AsRef<Path>, claims: &PathClaims) -> Result<Self> {
        let path = absolutize(path.as_ref())?;
        let claim = claims.claim(&path)?;

        if path.exists() {
            return Err(ArchiveError::PathConflict(path));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "DELETE")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute_batch(include_str!("../migrations/001_archive.sql"))?;
        conn.execute_batch("BEGIN IMMEDIATE")?;

        debug!(path = %path.display(), "Opened archive");

        Ok(Self {
            conn,
            path,
            next_event_part: 0,
            _claim: claim,
        })
    }

    /// Absolute path of the archive.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn put_member(&self, name: &str, part: i64, body: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO members (name, part, body) VALUES (?1, ?2, ?3)",
            params![name, part, body],
        )?;
        Ok(())
    }

    /// Write (or replace) the metadata member.
    pub fn write_metadata(&mut self, meta: &ArchiveMetadata) -> Result<()> {
        let json = serde_json::to_vec(meta)?;
        self.put_member(METADATA_MEMBER, 0, &json)
    }

    /// Append events as a new part of the events member.
    pub fn append_events(&mut self, events: &[CaptureEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let body = encode_events(events);
        self.put_member(EVENTS_MEMBER, self.next_event_part, &body)?;
        self.next_event_part += 1;
        Ok(())
    }

    /// Write the final metadata and markers, commit, and close the file.
    ///
    /// Consumes the writer: a sealed archive accepts no further writes.
    pub fn seal(mut self, final_meta: &ArchiveMetadata, markers: &[Marker]) -> Result<PathBuf> {
        if self.next_event_part == 0 {
            // The events member always exists, even when empty.
            self.put_member(EVENTS_MEMBER, 0, &[])?;
            self.next_event_part = 1;
        }
        self.write_metadata(final_meta)?;
        let markers_json = serde_json::to_vec(markers)?;
        self.put_member(MARKERS_MEMBER, 0, &markers_json)?;
        self.conn.execute_batch("COMMIT")?;

        let Self {
            conn, path, _claim, ..
        } = self;
        conn.close().map_err(|(_, e)| ArchiveError::Database(e))?;
        debug!(path = %path.display(), "Sealed archive");
        drop(_claim);
        Ok(path)
    }
}
