//! Archive error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while writing, reading or naming archives.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Archive path already in use: {}", .0.display())]
    PathConflict(PathBuf),

    #[error("Corrupt archive {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Invalid name pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl ArchiveError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ArchiveError::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the archive exists but cannot be trusted.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, ArchiveError::Corrupt { .. })
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
