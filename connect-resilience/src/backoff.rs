//! Exponential backoff with jitter
//!
//! Computes the delay before the next probe attempt. The deterministic
//! component doubles per attempt up to a cap; a bounded random jitter is
//! added so a fleet of clients recovering from the same outage does not
//! retry in lockstep.

use crate::TuningParameters;
use std::time::Duration;

/// Retry delay calculator
///
/// `delay(attempt)` is pure with respect to the attempt count except for the
/// jitter contribution. The attempt counter itself lives in the monitor;
/// the controller only maps counts to delays.
#[derive(Debug, Clone)]
pub struct BackoffController {
    /// Initial delay
    base: Duration,
    /// Delay cap
    max: Duration,
    /// Upper bound of the random jitter added to each delay
    jitter_max: Duration,
}

impl BackoffController {
    /// Create a controller from current tuning parameters
    pub fn new(tuning: &TuningParameters, jitter_max: Duration) -> Self {
        Self {
            base: tuning.base_backoff,
            max: tuning.max_backoff,
            jitter_max,
        }
    }

    /// Adopt new backoff bounds after a tuning change
    pub fn retune(&mut self, tuning: &TuningParameters) {
        self.base = tuning.base_backoff;
        self.max = tuning.max_backoff;
    }

    /// Delay before retry number `attempt` (0-based)
    ///
    /// `min(base * 2^attempt + jitter, max)`, jitter uniform in
    /// `[0, jitter_max]`. The deterministic component is non-decreasing in
    /// `attempt`; the total never exceeds `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self.exponential(attempt);
        let jitter_bound = self.jitter_max.as_millis() as u64;
        let jitter = if jitter_bound == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::random::<u64>() % (jitter_bound + 1))
        };
        exponential.saturating_add(jitter).min(self.max)
    }

    /// Deterministic component of `delay`, capped at `max`
    pub fn exponential(&self, attempt: u32) -> Duration {
        // Shift saturates well past any realistic retry budget
        let factor = 1u64 << attempt.min(20);
        self.base.saturating_mul(factor as u32).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> TuningParameters {
        TuningParameters {
            heartbeat_interval: Duration::from_secs(30),
            max_queue_size: 50,
            max_retries: 5,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_delay_within_envelope() {
        let controller = BackoffController::new(&tuning(), Duration::from_secs(5));

        for attempt in 0..8 {
            let floor = controller.exponential(attempt);
            // Jitter is random per call; check the bounds, not the value
            for _ in 0..20 {
                let delay = controller.delay(attempt);
                assert!(delay >= floor.min(Duration::from_secs(60)));
                assert!(delay <= (floor + Duration::from_secs(5)).min(Duration::from_secs(60)));
            }
        }
    }

    #[test]
    fn test_exponential_is_non_decreasing_up_to_cap() {
        let controller = BackoffController::new(&tuning(), Duration::from_secs(5));

        let mut previous = Duration::ZERO;
        for attempt in 0..16 {
            let current = controller.exponential(attempt);
            assert!(current >= previous);
            assert!(current <= Duration::from_secs(60));
            previous = current;
        }
        assert_eq!(controller.exponential(15), Duration::from_secs(60));
    }

    #[test]
    fn test_delay_never_exceeds_cap() {
        let controller = BackoffController::new(&tuning(), Duration::from_secs(5));
        for _ in 0..50 {
            assert!(controller.delay(30) <= Duration::from_secs(60));
        }
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let controller = BackoffController::new(&tuning(), Duration::ZERO);
        assert_eq!(controller.delay(0), Duration::from_secs(1));
        assert_eq!(controller.delay(1), Duration::from_secs(2));
        assert_eq!(controller.delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_retune_adopts_new_bounds() {
        let mut controller = BackoffController::new(&tuning(), Duration::ZERO);
        let slower = TuningParameters {
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(120),
            ..tuning()
        };
        controller.retune(&slower);
        assert_eq!(controller.delay(0), Duration::from_secs(2));
        assert_eq!(controller.exponential(10), Duration::from_secs(120));
    }
}
