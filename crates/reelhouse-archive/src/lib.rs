//! # reelhouse-archive
//!
//! The archive container format for reelhouse recordings.
//!
//! This crate provides:
//! - [`ArchiveWriter`]: creates an archive, stages metadata and events, and
//!   seals everything in a single transaction
//! - [`Archive`]: reads and validates a sealed archive
//! - [`NamingPolicy`]: collision-free, date-partitioned archive file names
//! - [`catalog::scan`]: lists archives under a recording root
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reelhouse_archive::{Archive, ArchiveMetadata, ArchiveWriter, PathClaims};
//!
//! let claims = PathClaims::new();
//! let mut writer = ArchiveWriter::open("replay/2024_05_17/alice_12-00-00_1.mcpr", &claims)?;
//! let meta = ArchiveMetadata::new("my-server", "alice", "alice", started_at_ms);
//! writer.write_metadata(&meta)?;
//! writer.append_events(&events)?;
//! let path = writer.seal(&meta.finalized(ended_at_ms), &markers)?;
//!
//! let archive = Archive::open(&path)?;
//! ```
//!
//! ## Container Layout
//!
//! An archive is a single SQLite file with a `members` table. Members are
//! looked up by name:
//! - `metadata` - JSON record (server, subject, format version, start time,
//!   duration, generator)
//! - `events` - framed event payload, `[offset u32][len u32][bytes]` per event
//! - `markers` - JSON list of named offsets

pub mod catalog;
pub mod error;
pub mod format;
pub mod naming;
pub mod reader;
pub mod writer;

pub use catalog::ArchiveEntry;
pub use error::{ArchiveError, Result};
pub use format::{duration_secs, ArchiveMetadata};
pub use naming::{day_partition, sanitize_name, NamingPolicy};
pub use reader::Archive;
pub use writer::{ArchiveWriter, PathClaims};
