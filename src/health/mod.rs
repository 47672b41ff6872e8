// Health module - network liveness checks against the worker

mod policy;
pub mod probe;

pub use policy::{FailurePolicy, Verdict};
pub use probe::{HealthProbe, ProbeFailure, ProbeOutcome, PING, PONG};

use crate::config::{HealthConfig, WorkerConfig};
use std::time::Duration;
use tracing::{info, warn};

/// Probe plus failure policy: one call per tick yields one [`Verdict`]
pub struct HealthMonitor {
    probe: HealthProbe,
    policy: FailurePolicy,
}

impl HealthMonitor {
    pub fn new(worker: &WorkerConfig, health: &HealthConfig) -> Self {
        Self {
            probe: HealthProbe::new(
                worker.address(),
                health.pong_timeout(),
                health.connect_timeout(),
            ),
            policy: FailurePolicy::new(health.max_failures),
        }
    }

    /// Probe the worker once and fold the outcome into the failure policy
    ///
    /// Returns the verdict and, on success, the round-trip time.
    pub async fn check(&mut self) -> (Verdict, Option<Duration>) {
        match self.probe.probe().await {
            ProbeOutcome::Pong { rtt } => {
                info!("Worker answered PONG in {} usec", rtt.as_micros());
                (self.policy.record_success(), Some(rtt))
            }
            ProbeOutcome::Failed(failure) => {
                let verdict = self.policy.record_failure();
                match verdict {
                    Verdict::Restart => warn!(
                        "Health check failed ({}), threshold of {} reached",
                        failure,
                        self.policy.threshold()
                    ),
                    _ => warn!(
                        "Health check failed ({}) against {}, {} of {}",
                        failure,
                        self.probe.addr(),
                        self.policy.failures(),
                        self.policy.threshold()
                    ),
                }
                (verdict, None)
            }
        }
    }

    pub fn failures(&self) -> u32 {
        self.policy.failures()
    }

    /// Forget the failure count, e.g. after a completed restart
    pub fn reset(&mut self) {
        self.policy.reset();
    }

    /// Close the health-check connection
    pub fn disconnect(&mut self) {
        self.probe.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.probe.is_connected()
    }
}
