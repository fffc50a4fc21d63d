//! Monotonic clock abstraction behind every bounded wait.
//!
//! The driver never sleeps or reads wall time directly: all polling loops
//! take their notion of "now" and their delay hook from a [`Clock`], so a
//! test can run the full 60-second calibration timeout in microseconds of
//! real time. [`Clock::delay`] is also the cooperative yield point on the
//! long calibration waits — the driver is single-threaded and never blocks
//! anywhere else.

use std::cell::Cell;
use std::fmt::Debug;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic time source and delay provider.
pub trait Clock: Debug {
    /// Monotonic time elapsed since an arbitrary origin.
    fn now(&self) -> Duration;

    /// Pause for roughly `d`. Busy-poll loops call this between register
    /// reads; it is the only place the driver gives up the CPU.
    fn delay(&self, d: Duration);
}

/// Real time: `std::time::Instant` plus `thread::sleep`.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is the moment of construction.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn delay(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// Simulated time for tests: `delay` advances `now`, nothing sleeps.
///
/// Cloning yields a handle onto the same timeline, so a test can keep one
/// clone for inspection after boxing the other into the driver. A non-zero
/// `step` makes every `delay` advance at least that much, which lets a test
/// cross a multi-second timeout in a few hundred poll iterations.
#[derive(Debug, Clone, Default)]
pub struct FakeClock {
    now: Rc<Cell<Duration>>,
    step: Duration,
}

impl FakeClock {
    /// Create a fake clock at time zero where `delay(d)` advances exactly `d`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fake clock whose every `delay` advances at least `step`.
    #[must_use]
    pub fn with_step(step: Duration) -> Self {
        Self {
            now: Rc::new(Cell::new(Duration::ZERO)),
            step,
        }
    }

    /// Advance the timeline by `d`.
    pub fn advance(&self, d: Duration) {
        self.now.set(self.now.get() + d);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn delay(&self, d: Duration) {
        self.advance(d.max(self.step));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_delay_advances_time() {
        let clock = FakeClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        clock.delay(Duration::from_millis(7));
        assert_eq!(clock.now(), Duration::from_millis(7));
    }

    #[test]
    fn fake_clock_step_dominates_short_delays() {
        let clock = FakeClock::with_step(Duration::from_millis(10));
        clock.delay(Duration::from_micros(1));
        assert_eq!(clock.now(), Duration::from_millis(10));
        clock.delay(Duration::from_millis(25));
        assert_eq!(clock.now(), Duration::from_millis(35));
    }

    #[test]
    fn fake_clock_clones_share_the_timeline() {
        let clock = FakeClock::new();
        let handle = clock.clone();
        clock.advance(Duration::from_secs(1));
        assert_eq!(handle.now(), Duration::from_secs(1));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
