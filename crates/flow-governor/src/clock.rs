//! Time sources for generation bookkeeping.
//!
//! The governor never reads the wall clock directly. Production code uses
//! [`SystemClock`]; tests drive a [`ManualClock`] so generation timing is
//! deterministic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic time source.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Instant;
}

/// Monotonic system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Simulated clock that only moves when told to.
///
/// Clones share the same time, so a test can keep one handle while the
/// governor owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset_us: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock frozen at an arbitrary starting instant.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.offset_us
            .fetch_add(by.as_micros() as u64, Ordering::Relaxed);
    }

    /// Sets the clock to `offset` past its starting instant.
    pub fn set(&self, offset: Duration) {
        self.offset_us
            .store(offset.as_micros() as u64, Ordering::Relaxed);
    }

    /// Returns how far the clock has moved since creation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.offset_us.load(Ordering::Relaxed))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new();
        let t0 = clock.now();

        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.now() - t0, Duration::from_millis(1500));

        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();

        handle.set(Duration::from_secs(7));
        assert_eq!(clock.elapsed(), Duration::from_secs(7));
        assert_eq!(clock.now(), handle.now());
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
