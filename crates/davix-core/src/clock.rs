//! Wall clock abstraction.
//!
//! Lease expiry and retry scheduling compare stored Unix timestamps against
//! "now". Production code reads the system clock; tests drive a
//! [`ManualClock`] forward to simulate lease expiry without sleeping.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::db::unix_timestamp;

/// Source of the current time in Unix seconds.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> i64;
}

/// Reads the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        unix_timestamp()
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub const fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Move the clock forward by `secs` seconds.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, ts: i64) {
        self.now.store(ts, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(unix_timestamp())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        clock.advance(61);
        assert_eq!(clock.now(), 1_061);
        clock.set(5);
        assert_eq!(clock.now(), 5);
    }

    #[test]
    fn system_clock_is_reasonable() {
        // After 2024-01-01
        assert!(SystemClock.now() > 1_704_067_200);
    }
}
