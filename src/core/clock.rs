//! Millisecond timeline clock, lock-free
//!
//! Two instances drive the engine: the playback clock (written by the
//! embedding player) and the cache-ahead clock (written by the worker). Each
//! has a single writer; readers only pace themselves, so relaxed ordering is
//! enough.

use std::sync::atomic::{AtomicI64, Ordering};

/// Atomic millisecond position on the presentation timeline
#[derive(Debug, Default)]
pub struct TimelineClock {
    ms: AtomicI64,
}

impl TimelineClock {
    pub fn new(ms: i64) -> Self {
        Self {
            ms: AtomicI64::new(ms),
        }
    }

    /// Current position in milliseconds
    pub fn millis(&self) -> i64 {
        self.ms.load(Ordering::Relaxed)
    }

    /// Set an absolute position, returning the delta from the previous one
    pub fn update(&self, ms: i64) -> i64 {
        let prev = self.ms.swap(ms, Ordering::Relaxed);
        ms - prev
    }

    /// Move relative to the current position, returning the new position
    pub fn advance(&self, delta_ms: i64) -> i64 {
        self.ms.fetch_add(delta_ms, Ordering::Relaxed) + delta_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_returns_delta() {
        let clock = TimelineClock::new(1000);
        assert_eq!(clock.millis(), 1000);
        assert_eq!(clock.update(1500), 500);
        assert_eq!(clock.update(1200), -300);
        assert_eq!(clock.millis(), 1200);
    }

    #[test]
    fn test_advance_accumulates() {
        let clock = TimelineClock::default();
        assert_eq!(clock.advance(40), 40);
        assert_eq!(clock.advance(40), 80);
        assert_eq!(clock.millis(), 80);
    }

    /// Test: single writer, concurrent reader
    /// Validates: a reader never observes the clock rolling back while the
    /// writer walks it forward
    #[test]
    fn test_reader_sees_monotonic_updates() {
        use std::sync::Arc;
        use std::thread;

        let clock = Arc::new(TimelineClock::new(0));
        let writer = {
            let clock = Arc::clone(&clock);
            thread::spawn(move || {
                for t in 1..=10_000 {
                    clock.update(t);
                }
            })
        };

        let mut last = 0;
        while last < 10_000 {
            let now = clock.millis();
            assert!(now >= last, "clock rolled back: {} after {}", now, last);
            last = now;
        }
        writer.join().unwrap();
    }
}
