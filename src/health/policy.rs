/// What the supervisor should do after a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The probe succeeded
    Healthy,
    /// The probe failed but the threshold has not been reached
    Degraded { failures: u32 },
    /// The threshold-th consecutive failure: restart the worker
    Restart,
}

/// Consecutive-failure counter with a restart threshold
///
/// Up to `threshold - 1` consecutive failures are tolerated. The threshold-th
/// yields [`Verdict::Restart`] exactly once and resets the counter.
#[derive(Debug, Clone)]
pub struct FailurePolicy {
    threshold: u32,
    failures: u32,
}

impl FailurePolicy {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn record_success(&mut self) -> Verdict {
        self.failures = 0;
        Verdict::Healthy
    }

    pub fn record_failure(&mut self) -> Verdict {
        self.failures += 1;
        if self.failures >= self.threshold {
            self.failures = 0;
            Verdict::Restart
        } else {
            Verdict::Degraded {
                failures: self.failures,
            }
        }
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_below_threshold_do_not_restart() {
        for threshold in 2..6 {
            let mut policy = FailurePolicy::new(threshold);
            for k in 1..threshold {
                assert_eq!(policy.record_failure(), Verdict::Degraded { failures: k });
                assert_eq!(policy.failures(), k);
            }
        }
    }

    #[test]
    fn test_threshold_failure_restarts_once_and_resets() {
        let mut policy = FailurePolicy::new(3);
        policy.record_failure();
        policy.record_failure();

        assert_eq!(policy.record_failure(), Verdict::Restart);
        assert_eq!(policy.failures(), 0);

        // The next failure starts a fresh run
        assert_eq!(policy.record_failure(), Verdict::Degraded { failures: 1 });
    }

    #[test]
    fn test_success_resets_counter() {
        let mut policy = FailurePolicy::new(5);
        for _ in 0..4 {
            policy.record_failure();
        }
        assert_eq!(policy.failures(), 4);

        assert_eq!(policy.record_success(), Verdict::Healthy);
        assert_eq!(policy.failures(), 0);
    }

    #[test]
    fn test_threshold_of_one_restarts_immediately() {
        let mut policy = FailurePolicy::new(1);
        assert_eq!(policy.record_failure(), Verdict::Restart);
        assert_eq!(policy.record_failure(), Verdict::Restart);
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let policy = FailurePolicy::new(0);
        assert_eq!(policy.threshold(), 1);
    }
}
