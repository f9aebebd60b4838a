//! Millisecond clocks used for weak-entry timestamps.
//!
//! The cache never assumes the clock is monotonic: entries only ever extend
//! their timestamps forward, so a clock stepping backwards cannot shorten an
//! entry's life.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock milliseconds.
pub trait Clock: Send + Sync + fmt::Debug {
    fn millis(&self) -> u64;
}

/// Wall clock backed by `SystemTime`.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn millis(&self) -> u64 {
        // A clock before the epoch reads as zero; timestamps never regress anyway.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually driven clock for deterministic tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(millis: u64) -> Self {
        Self {
            now: AtomicU64::new(millis),
        }
    }

    /// Jump to an absolute time; moving backwards is allowed.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::Release);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn millis(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_both_ways() {
        let c = ManualClock::new(100);
        assert_eq!(c.millis(), 100);
        c.advance(Duration::from_millis(50));
        assert_eq!(c.millis(), 150);
        c.set(20);
        assert_eq!(c.millis(), 20);
    }

    #[test]
    fn system_clock_is_past_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.millis() > 1_577_836_800_000);
    }
}
