use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Per-downstream circuit breaker (spec.md §5 "Circuit breakers & retry").
/// Shared by the KV and document-index client wrappers: trips after
/// `failure_threshold` consecutive failures, stays open for `cooldown`,
/// then half-opens for a single probe. Same "small counter state behind a
/// mutex, atomics for the hot read path" discipline as `hermes`'s
/// token-bucket rate limiter.
pub struct CircuitBreaker {
    name: &'static str,
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<State>,
    trips: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Closed { consecutive_failures: u32 },
    Open { opened_at: Instant },
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    Allowed,
    Probe,
    Denied,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name,
            failure_threshold,
            cooldown,
            state: Mutex::new(State::Closed { consecutive_failures: 0 }),
            trips: AtomicU64::new(0),
        }
    }

    /// Whether a call should proceed. `Probe` means exactly one caller is
    /// allowed through to test recovery; every other caller sees `Denied`
    /// until that probe reports back via `record_success`/`record_failure`.
    pub fn check(&self) -> Permit {
        let mut state = self.state.lock();
        match *state {
            State::Closed { .. } => Permit::Allowed,
            State::Open { opened_at } => {
                if opened_at.elapsed() >= self.cooldown {
                    *state = State::HalfOpen;
                    Permit::Probe
                } else {
                    Permit::Denied
                }
            }
            State::HalfOpen => Permit::Denied,
        }
    }

    pub fn record_success(&self) {
        *self.state.lock() = State::Closed { consecutive_failures: 0 };
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        match *state {
            State::Closed { consecutive_failures } => {
                let failures = consecutive_failures + 1;
                if failures >= self.failure_threshold {
                    self.trips.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::prometheus::counters::breaker_trips_total(self.name);
                    *state = State::Open { opened_at: Instant::now() };
                } else {
                    *state = State::Closed { consecutive_failures: failures };
                }
            }
            State::HalfOpen => {
                self.trips.fetch_add(1, Ordering::Relaxed);
                crate::metrics::prometheus::counters::breaker_trips_total(self.name);
                *state = State::Open { opened_at: Instant::now() };
            }
            State::Open { .. } => {}
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.lock(), State::Open { .. })
    }

    pub fn trip_count(&self) -> u64 {
        self.trips.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_secs(60));
        assert_eq!(breaker.check(), Permit::Allowed);
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());
        assert_eq!(breaker.check(), Permit::Denied);
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }

    #[test]
    fn half_open_probe_reopens_on_failure() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(1));
        breaker.record_failure();
        assert!(breaker.is_open());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(breaker.check(), Permit::Probe);
        breaker.record_failure();
        assert!(breaker.is_open());
        assert_eq!(breaker.trip_count(), 2);
    }
}
