//! Wall clock abstraction.
//!
//! Naming, day partitions and durations all read local wall-clock time
//! through [`Clock`] so tests can drive time explicitly.

use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone};
use parking_lot::Mutex;

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current local time.
    fn now(&self) -> DateTime<Local>;

    /// Current day partition date.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to. Cheap to clone; clones share time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Local>>>,
}

impl ManualClock {
    /// Create a clock reading the given instant.
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Create a clock at a local date and time.
    ///
    /// Ambiguous local times resolve to the earliest instant; nonexistent
    /// ones (inside a DST gap) fall back to the current time.
    pub fn at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        let now = Local
            .with_ymd_and_hms(year, month, day, hour, min, sec)
            .earliest()
            .unwrap_or_else(Local::now);
        Self::new(now)
    }

    /// Set the current time.
    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock() = now;
    }

    /// Move time forward (or backward, for a negative duration).
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock()
    }
}

/// The next local midnight strictly after `now`.
pub fn next_midnight(now: DateTime<Local>) -> DateTime<Local> {
    let mut date = now.date_naive();
    loop {
        date = date.succ_opt().unwrap_or(date);
        if let Some(midnight) = date
            .and_hms_opt(0, 0, 0)
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        {
            if midnight > now {
                return midnight;
            }
        }
        // Midnight skipped by a DST transition: take the first hour that exists.
        if let Some(fallback) = date
            .and_hms_opt(1, 0, 0)
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        {
            if fallback > now {
                return fallback;
            }
        }
    }
}

/// Time remaining until the next local midnight.
pub fn until_midnight(now: DateTime<Local>) -> std::time::Duration {
    (next_midnight(now) - now)
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}
