use std::time::{Duration, Instant};

/// Lifecycle state of the supervised worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// No worker is tracked
    Idle,
    /// Spawned, within or just past its startup grace period
    Started,
    /// The last probe succeeded
    Healthy,
    /// The failure threshold was reached; a restart is imminent
    Unhealthy,
    /// A termination signal has been sent
    Terminating,
}

impl ProcessState {
    /// Whether the health monitor has anything to check in this state
    pub fn is_probe_eligible(&self) -> bool {
        matches!(
            self,
            ProcessState::Started | ProcessState::Healthy | ProcessState::Unhealthy
        )
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Idle => write!(f, "idle"),
            ProcessState::Started => write!(f, "started"),
            ProcessState::Healthy => write!(f, "healthy"),
            ProcessState::Unhealthy => write!(f, "unhealthy"),
            ProcessState::Terminating => write!(f, "terminating"),
        }
    }
}

/// Bookkeeping for the currently tracked worker
#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub pid: u32,
    pub started_at: Instant,
    /// Restarts performed before this worker was spawned
    pub restarts: usize,
    /// Round-trip time of the last successful probe
    pub last_rtt: Option<Duration>,
}

impl WorkerStats {
    pub fn new(pid: u32, restarts: usize) -> Self {
        Self {
            pid,
            started_at: Instant::now(),
            restarts,
            last_rtt: None,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_eligibility() {
        assert!(!ProcessState::Idle.is_probe_eligible());
        assert!(ProcessState::Started.is_probe_eligible());
        assert!(ProcessState::Healthy.is_probe_eligible());
        assert!(ProcessState::Unhealthy.is_probe_eligible());
        assert!(!ProcessState::Terminating.is_probe_eligible());
    }

    #[test]
    fn test_display() {
        assert_eq!(ProcessState::Terminating.to_string(), "terminating");
        assert_eq!(ProcessState::Idle.to_string(), "idle");
    }
}
