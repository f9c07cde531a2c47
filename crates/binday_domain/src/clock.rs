use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use parking_lot::Mutex;

/// Source of local wall-clock time for the scheduler.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
    /// Maps a local wall-clock time to an instant. `None` when the time does
    /// not exist locally (e.g. inside a DST gap).
    fn resolve(&self, local: NaiveDateTime) -> Option<DateTime<Utc>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn resolve(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        Local
            .from_local_datetime(&local)
            .earliest()
            .map(|at| at.with_timezone(&Utc))
    }
}

/// Pinned clock whose local zone is UTC.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }

    fn resolve(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        Some(local.and_utc())
    }
}
