//! # Time Sources
//!
//! Components that compare against the current instant (credential expiry,
//! the stale-visit sweep, exit durations) read it through [`TimeSource`]
//! instead of calling `Utc::now()` directly.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::temporal::Timestamp;

/// Source of the current UTC instant.
pub trait TimeSource: Send + Sync {
    /// The current instant, truncated to seconds.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
///
/// Shared between a test and the engine under test through an `Arc`.
#[derive(Debug)]
pub struct ManualTimeSource {
    epoch_secs: AtomicI64,
}

impl ManualTimeSource {
    /// Start the clock at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            epoch_secs: AtomicI64::new(start.epoch_secs()),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: Timestamp) {
        self.epoch_secs.store(to.epoch_secs(), Ordering::SeqCst);
    }

    /// Move the clock forward by `secs` seconds.
    pub fn advance_secs(&self, secs: i64) {
        self.epoch_secs.fetch_add(secs, Ordering::SeqCst);
    }

    /// Move the clock forward by whole hours.
    pub fn advance_hours(&self, hours: i64) {
        self.advance_secs(hours * 3_600);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        let secs = self.epoch_secs.load(Ordering::SeqCst);
        // Only constructed from a valid Timestamp and advanced by tests.
        Timestamp::from_epoch_secs(secs).unwrap_or_else(|_| Timestamp::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = Timestamp::parse("2026-03-01T08:00:00Z").unwrap();
        let clock = ManualTimeSource::new(start);
        assert_eq!(clock.now(), start);
        clock.advance_hours(2);
        assert_eq!(clock.now().to_iso8601(), "2026-03-01T10:00:00Z");
        clock.advance_secs(1);
        assert_eq!(clock.now().to_iso8601(), "2026-03-01T10:00:01Z");
    }

    #[test]
    fn manual_clock_set() {
        let clock = ManualTimeSource::new(Timestamp::now());
        let target = Timestamp::parse("2030-01-01T00:00:00Z").unwrap();
        clock.set(target);
        assert_eq!(clock.now(), target);
    }

    #[test]
    fn system_clock_is_close_to_now() {
        let before = Timestamp::now();
        let t = SystemTimeSource.now();
        assert!(t >= before);
    }
}
