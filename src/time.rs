// src/time.rs - Time source used by the execution worker
use std::time::{Duration, SystemTime};

/// Wall clock and sleep, injectable so pacing can be observed without real delays.
pub trait TimeInterface: Send + Sync {
    fn now_wallclock(&self) -> SystemTime;
    fn sleep(&self, duration: Duration);
}

/// Standard time source backed by `std::time` and `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeInterface for SystemClock {
    fn now_wallclock(&self) -> SystemTime {
        SystemTime::now()
    }

    /// Sleeps the calling thread for the specified duration.
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_system_clock_sleeps() {
        let clock = SystemClock;
        let start = Instant::now();
        clock.sleep(Duration::from_millis(5));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_zero_sleep_returns_immediately() {
        let clock = SystemClock;
        let start = Instant::now();
        clock.sleep(Duration::ZERO);
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
