//! # reelhouse-session
//!
//! Recording sessions and their lifecycle for reelhouse.
//!
//! This crate provides:
//! - [`Session`]: one subject's recording, buffered in memory and sealed
//!   into an archive on stop
//! - [`SessionRegistry`]: at most one session per key, with bulk and
//!   detached stops
//! - Midnight rotation and the retention sweep ([`scheduler`], [`retention`])
//! - Instant replays of the last few minutes of a live session
//! - [`Recorder`]: the small API host command handlers and event hooks use
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reelhouse_core::{Config, SessionKey, SystemClock};
//! use reelhouse_session::{NoopHandler, Recorder};
//!
//! let recorder = Recorder::init(Config::load_validated()?, Arc::new(SystemClock), Arc::new(NoopHandler));
//!
//! let key = SessionKey::Subject(player.id());
//! recorder.start_session(key.clone(), player.clone());
//! recorder.record_event(&key, packet_bytes);
//! let file_name = recorder.stop_session(&key);
//!
//! recorder.shutdown().await;
//! ```
//!
//! ## Storage Layout
//!
//! Archives are written to
//! `<root>/<yyyy_MM_dd>/<subject>_<HH-mm-ss>_<seq>.<ext>`. The day
//! partition advances at local midnight; sessions active at that moment
//! are sealed and restarted under the new partition.

pub mod error;
pub mod instant;
pub mod recorder;
pub mod registry;
pub mod retention;
pub mod scheduler;
pub mod session;
pub mod testing;

// Re-export commonly used types
pub use error::{RecorderError, Result};
pub use recorder::{NoopHandler, Recorder, RecordingEventHandler};
pub use registry::{RegistryOptions, SessionHandle, SessionRegistry};
pub use retention::{remove_orphan_journals, RetentionSweep, SweepReport};
pub use scheduler::{rotate, RotationReport};
pub use session::{ArchiveContext, Session};
