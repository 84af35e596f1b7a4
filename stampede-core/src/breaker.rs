use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Error-rate fraction (0..=1) at which the breaker opens.
    pub threshold: f64,
    /// Minimum completed attempts before the threshold is evaluated.
    pub min_sample_size: u64,
    /// Cooldown after opening; the next attempt past it closes the breaker.
    pub reset_after: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_sample_size: 20,
            reset_after: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    open: bool,
    errors: u64,
    successes: u64,
    last_triggered_at: Option<Instant>,
}

/// Diagnostic event emitted on the CLOSED -> OPEN transition.
///
/// Circuit-open is flow control, not an error; callers log this and move on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerTrip {
    pub error_rate: f64,
    pub errors: u64,
    pub samples: u64,
}

/// Rolling success/error tracker shared by every concurrent session.
///
/// Opens once the error rate crosses the threshold over at least
/// `min_sample_size` attempts; closes (and resets both counts) on the first
/// execution attempt after the cooldown elapses.
#[derive(Debug)]
pub struct CircuitBreaker {
    cfg: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(cfg: BreakerConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Whether a new request may proceed. Closes the breaker first if the
    /// cooldown has elapsed; the request that observes the close is allowed
    /// through and counted like any other.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    pub fn allow_at(&self, now: Instant) -> bool {
        let mut st = self.state.lock();
        if !st.open {
            return true;
        }

        let elapsed_cooldown = st
            .last_triggered_at
            .is_some_and(|at| now.duration_since(at) >= self.cfg.reset_after);
        if elapsed_cooldown {
            // Fresh sampling window.
            st.open = false;
            st.errors = 0;
            st.successes = 0;
            return true;
        }

        false
    }

    /// Record one completed attempt. Returns the trip event when this update
    /// opens the breaker.
    pub fn record(&self, success: bool) -> Option<BreakerTrip> {
        self.record_at(success, Instant::now())
    }

    pub fn record_at(&self, success: bool, now: Instant) -> Option<BreakerTrip> {
        let mut st = self.state.lock();
        if st.open {
            return None;
        }

        if success {
            st.successes += 1;
        } else {
            st.errors += 1;
        }

        let samples = st.errors + st.successes;
        if samples < self.cfg.min_sample_size {
            return None;
        }

        let error_rate = (st.errors as f64) / (samples as f64);
        if error_rate >= self.cfg.threshold {
            st.open = true;
            st.last_triggered_at = Some(now);
            return Some(BreakerTrip {
                error_rate,
                errors: st.errors,
                samples,
            });
        }

        None
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: f64, min_sample_size: u64, reset_after: Duration) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            threshold,
            min_sample_size,
            reset_after,
        })
    }

    #[test]
    fn opens_once_threshold_and_sample_size_are_met() {
        // 2 successes + 3 errors => rate 0.6 over 5 samples >= min 4.
        let b = breaker(0.55, 4, Duration::from_secs(30));
        let now = Instant::now();

        assert_eq!(b.record_at(true, now), None);
        assert_eq!(b.record_at(true, now), None);
        assert_eq!(b.record_at(false, now), None);
        assert_eq!(b.record_at(false, now), None); // rate 0.5 < 0.55
        let trip = match b.record_at(false, now) {
            Some(t) => t,
            None => panic!("breaker should have tripped"),
        };
        assert_eq!(trip.samples, 5);
        assert!((trip.error_rate - 0.6).abs() < 1e-9);
        assert!(b.is_open());
        assert!(!b.allow_at(now));
    }

    #[test]
    fn threshold_comparison_is_inclusive() {
        let b = breaker(0.5, 4, Duration::from_secs(30));
        let now = Instant::now();
        b.record_at(true, now);
        b.record_at(true, now);
        b.record_at(false, now);
        // rate exactly 0.5 at exactly min sample size => opens.
        assert!(b.record_at(false, now).is_some());
    }

    #[test]
    fn trip_event_carries_rate_and_counts() {
        let b = breaker(0.5, 2, Duration::from_secs(30));
        let now = Instant::now();
        b.record_at(false, now);
        let trip = match b.record_at(false, now) {
            Some(t) => t,
            None => panic!("expected trip"),
        };
        assert_eq!(trip.errors, 2);
        assert_eq!(trip.samples, 2);
        assert_eq!(trip.error_rate, 1.0);
    }

    #[test]
    fn updates_while_open_never_retrip() {
        let b = breaker(0.5, 2, Duration::from_secs(30));
        let now = Instant::now();
        b.record_at(false, now);
        assert!(b.record_at(false, now).is_some());
        assert!(b.record_at(false, now).is_none());
        assert!(b.record_at(true, now).is_none());
        assert!(b.is_open());
    }

    #[test]
    fn below_min_sample_size_never_opens() {
        let b = breaker(0.1, 10, Duration::from_secs(30));
        let now = Instant::now();
        for _ in 0..9 {
            assert_eq!(b.record_at(false, now), None);
        }
        assert!(!b.is_open());
    }

    #[test]
    fn closes_after_cooldown_and_resets_counts() {
        let b = breaker(0.5, 2, Duration::from_secs(10));
        let t0 = Instant::now();
        b.record_at(false, t0);
        b.record_at(false, t0);
        assert!(b.is_open());
        assert!(!b.allow_at(t0 + Duration::from_secs(9)));

        // Cooldown elapsed: next attempt closes the breaker and is allowed.
        assert!(b.allow_at(t0 + Duration::from_secs(10)));
        assert!(!b.is_open());

        // Counts reset: one error in the fresh window is below min sample.
        assert_eq!(b.record_at(false, t0 + Duration::from_secs(11)), None);
        assert!(!b.is_open());
    }

    #[test]
    fn successes_after_close_keep_it_closed() {
        let b = breaker(0.9, 2, Duration::from_secs(1));
        let t0 = Instant::now();
        b.record_at(false, t0);
        b.record_at(false, t0);
        assert!(b.is_open());
        assert!(b.allow_at(t0 + Duration::from_secs(2)));
        for i in 0..50u64 {
            assert_eq!(b.record_at(true, t0 + Duration::from_secs(3 + i)), None);
        }
        assert!(!b.is_open());
    }
}
