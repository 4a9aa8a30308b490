//! Archive reader.
//!
//! Locates members by name, never by offset. Any archive whose metadata
//! member is missing or unreadable is reported as corrupt.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};

use reelhouse_core::{CaptureEvent, Marker};

use crate::error::{ArchiveError, Result};
use crate::format::{decode_events, ArchiveMetadata, EVENTS_MEMBER, MARKERS_MEMBER, METADATA_MEMBER};

/// A fully loaded, validated archive.
#[derive(Debug, Clone)]
pub struct Archive {
    pub path: PathBuf,
    pub metadata: ArchiveMetadata,
    pub events: Vec<CaptureEvent>,
    pub markers: Vec<Marker>,
}

/// Read all parts of a member, concatenated in part order.
/// Returns `None` if the member has no parts.
fn read_member(conn: &Connection, path: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let mut stmt = conn
        .prepare("SELECT body FROM members WHERE name = ?1 ORDER BY part")
        .map_err(|e| ArchiveError::corrupt(path, format!("unreadable container: {}", e)))?;
    let parts = stmt
        .query_map(params![name], |row| row.get::<_, Vec<u8>>(0))
        .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| ArchiveError::corrupt(path, format!("unreadable member '{}': {}", name, e)))?;

    if parts.is_empty() {
        return Ok(None);
    }
    Ok(Some(parts.concat()))
}

impl Archive {
    /// Open and fully validate an archive.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(ArchiveError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("archive not found: {}", path.display()),
            )));
        }

        let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| ArchiveError::corrupt(&path, format!("not a container: {}", e)))?;

        let metadata = Self::read_metadata_from(&conn, &path)?;

        let events = match read_member(&conn, &path, EVENTS_MEMBER)? {
            Some(bytes) => decode_events(&path, &bytes)?,
            None => return Err(ArchiveError::corrupt(&path, "missing events member")),
        };

        let markers = match read_member(&conn, &path, MARKERS_MEMBER)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| ArchiveError::corrupt(&path, format!("unreadable markers: {}", e)))?,
            None => Vec::new(),
        };

        Ok(Self {
            path,
            metadata,
            events,
            markers,
        })
    }

    /// Read only the metadata record.
    pub fn read_metadata(path: impl AsRef<Path>) -> Result<ArchiveMetadata> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| ArchiveError::corrupt(path, format!("not a container: {}", e)))?;
        Self::read_metadata_from(&conn, path)
    }

    fn read_metadata_from(conn: &Connection, path: &Path) -> Result<ArchiveMetadata> {
        let bytes = read_member(conn, path, METADATA_MEMBER)?
            .ok_or_else(|| ArchiveError::corrupt(path, "missing metadata member"))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ArchiveError::corrupt(path, format!("unreadable metadata: {}", e)))
    }

    /// File name of the archive.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = Archive::open(tmp.path().join("nope.mcpr")).unwrap_err();
        assert!(matches!(err, ArchiveError::Io(_)));
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("garbage.mcpr");
        fs::write(&path, b"this is not an archive at all, just some bytes").unwrap();
        let err = Archive::open(&path).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_empty_file_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.mcpr");
        fs::write(&path, b"").unwrap();
        let err = Archive::open(&path).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_unparseable_metadata_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad-meta.mcpr");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(include_str!("../migrations/001_archive.sql"))
            .unwrap();
        conn.execute(
            "INSERT INTO members (name, part, body) VALUES ('metadata', 0, ?1)",
            params![b"{not json".to_vec()],
        )
        .unwrap();
        drop(conn);

        let err = Archive::read_metadata(&path).unwrap_err();
        assert!(err.is_corrupt());
    }
}
