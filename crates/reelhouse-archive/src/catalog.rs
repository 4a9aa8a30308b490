//! Listing archives on disk.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;
use walkdir::WalkDir;

/// An archive file found under a recording root.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub len: u64,
}

/// Recursively list files with the given extension under `root`.
///
/// A missing root yields an empty list. Unreadable entries are logged and
/// skipped. Results are sorted by path.
pub fn scan(root: &Path, extension: &str) -> Vec<ArchiveEntry> {
    if !root.exists() {
        return Vec::new();
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let matches_ext = entry
            .path()
            .extension()
            .map(|e| e.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if !matches_ext {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => entries.push(ArchiveEntry {
                path: entry.path().to_path_buf(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                len: meta.len(),
            }),
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Cannot stat archive");
            }
        }
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

/// Suffix SQLite gives the rollback journal next to an archive.
const JOURNAL_SUFFIX: &str = "-journal";

/// Path of the rollback journal that belongs to `archive`.
pub fn journal_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(JOURNAL_SUFFIX);
    PathBuf::from(name)
}

/// Archive a journal belongs to, if `path` is a journal for `extension`.
fn journal_archive(path: &Path, extension: &str) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(JOURNAL_SUFFIX)?;
    let (_, ext) = stem.rsplit_once('.')?;
    if !ext.eq_ignore_ascii_case(extension) {
        return None;
    }
    Some(path.with_file_name(stem))
}

/// Journals under `root` whose archive no longer exists.
///
/// A writer that crashes leaves its journal behind; once the archive is
/// gone, nothing will ever replay it.
pub fn orphan_journals(root: &Path, extension: &str) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }

    let mut orphans: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            journal_archive(entry.path(), extension)
                .map(|archive| !archive.exists())
                .unwrap_or(false)
        })
        .map(|entry| entry.path().to_path_buf())
        .collect();
    orphans.sort();
    orphans
}
