//! Clock abstractions used by the backoff engine, connection lifecycle, and
//! distributed lock so timing can be faked in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Clock abstraction so timing can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_millis(&self) -> u64;

    /// Wall-clock seconds since the epoch, used for values that must
    /// survive process restart (e.g. `BackoffState::last_failure_time`,
    /// lock record timestamps).
    fn unix_seconds(&self) -> u64;
}

/// Monotonic clock backed by `Instant::now()` and `SystemTime::now()`.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn unix_seconds(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }
}

/// A clock with a manually-advanced timestamp, for deterministic tests of
/// backoff cleanup, lock TTL expiry, and reconnection timing.
#[derive(Debug)]
pub struct FakeClock {
    millis: AtomicU64,
    unix_seconds: AtomicU64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { millis: AtomicU64::new(0), unix_seconds: AtomicU64::new(0) }
    }

    pub fn advance_millis(&self, delta: u64) {
        self.millis.fetch_add(delta, Ordering::SeqCst);
        self.unix_seconds.fetch_add(delta / 1000, Ordering::SeqCst);
    }

    pub fn set_unix_seconds(&self, value: u64) {
        self.unix_seconds.store(value, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }

    fn unix_seconds(&self) -> u64 {
        self.unix_seconds.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_deterministically() {
        let clock = FakeClock::new();
        assert_eq!(clock.now_millis(), 0);
        clock.advance_millis(1500);
        assert_eq!(clock.now_millis(), 1500);
        assert_eq!(clock.unix_seconds(), 1);
    }

    #[test]
    fn monotonic_clock_unix_seconds_is_plausible() {
        let clock = MonotonicClock::default();
        // Any time after 2020-01-01.
        assert!(clock.unix_seconds() > 1_577_836_800);
    }
}
