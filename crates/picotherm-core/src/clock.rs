//! Source of "now" for deciding which periods are still open.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use time::{Date, OffsetDateTime};

use picotherm_types::{date_start_ms, datetime_ms};

/// Current UTC time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant.
    fn now(&self) -> OffsetDateTime;

    /// The current UTC calendar day (the one still-open day).
    fn today(&self) -> Date {
        self.now().date()
    }
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A settable clock for tests and backfills.
#[derive(Debug)]
pub struct FixedClock {
    now_ms: AtomicI64,
}

impl FixedClock {
    /// A clock stopped at `now`.
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now_ms: AtomicI64::new(datetime_ms(now)),
        }
    }

    /// A clock stopped at noon UTC on `date`.
    pub fn at_noon(date: Date) -> Self {
        Self {
            now_ms: AtomicI64::new(date_start_ms(date) + 12 * 3_600_000),
        }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: OffsetDateTime) {
        self.now_ms.store(datetime_ms(now), Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        let nanos = i128::from(self.now_ms.load(Ordering::Relaxed)) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}
