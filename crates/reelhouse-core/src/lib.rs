//! # reelhouse-core
//!
//! Core types and abstractions for reelhouse, the per-subject session
//! recorder.
//!
//! This crate provides:
//! - Session keys, lifecycle states and capture event primitives
//! - The [`Subject`] liveness capability and the recording filter
//! - A wall clock abstraction with a manual clock for tests
//! - Configuration system
//! - Common error types

pub mod clock;
pub mod config;
pub mod error;
pub mod session;
pub mod subject;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use session::{CaptureEvent, Marker, SessionKey, SessionState};
pub use subject::{RecordingFilter, Subject};
