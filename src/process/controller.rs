use crate::config::WorkerConfig;
use crate::error::{BeaconError, Result};
use crate::events::EventSender;
use crate::process::spawner::spawn_worker;
use crate::process::types::{ProcessState, WorkerStats};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Owns the worker process: spawning, signalling and reaping
///
/// Exactly one worker is tracked at a time. A new spawn is only accepted from
/// [`ProcessState::Idle`], so a worker that is still terminating can never be
/// tracked alongside its replacement.
pub struct LifecycleController {
    config: WorkerConfig,
    events: EventSender,
    state: ProcessState,
    keepalive: bool,
    worker: Option<WorkerStats>,
    spawns: usize,
    /// First instant a probe may run against the current worker
    probe_after: Option<Instant>,
    /// SIGKILL escalation point after a graceful terminate
    stop_deadline: Option<Instant>,
    /// When a keepalive respawn becomes due
    respawn_at: Option<Instant>,
}

impl LifecycleController {
    pub fn new(config: WorkerConfig, events: EventSender) -> Self {
        let keepalive = config.keepalive;
        Self {
            config,
            events,
            state: ProcessState::Idle,
            keepalive,
            worker: None,
            spawns: 0,
            probe_after: None,
            stop_deadline: None,
            respawn_at: None,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// PID of the tracked worker, if any
    pub fn pid(&self) -> Option<u32> {
        self.worker.as_ref().map(|w| w.pid)
    }

    pub fn worker(&self) -> Option<&WorkerStats> {
        self.worker.as_ref()
    }

    pub fn keepalive(&self) -> bool {
        self.keepalive
    }

    pub fn disable_keepalive(&mut self) {
        self.keepalive = false;
        self.respawn_at = None;
    }

    /// Number of spawns after the first
    pub fn restarts(&self) -> usize {
        self.spawns.saturating_sub(1)
    }

    /// Launch the worker
    ///
    /// Rejected with `InvalidProcessState` unless idle. A launch failure is a
    /// `SpawnError`, which the supervisor treats as fatal.
    pub fn spawn(&mut self) -> Result<u32> {
        if self.state != ProcessState::Idle {
            return Err(BeaconError::InvalidProcessState(format!(
                "cannot spawn while worker is {}",
                self.state
            )));
        }

        let spawned = spawn_worker(&self.config, &self.events)?;
        let pid = spawned.pid;
        let restarts = self.spawns;

        self.spawns += 1;
        self.worker = Some(WorkerStats::new(pid, restarts));
        self.state = ProcessState::Started;
        self.probe_after = Some(Instant::now() + self.config.startup_grace());
        self.stop_deadline = None;
        self.respawn_at = None;

        info!(
            "Started worker {} (PID: {}, restarts: {})",
            self.config.bin.display(),
            pid,
            restarts
        );

        Ok(pid)
    }

    /// Signal the tracked worker to stop
    ///
    /// Graceful termination sends SIGTERM and arms the stop deadline; otherwise
    /// SIGKILL is sent. Returns `false` when no worker is tracked. The exit
    /// itself is observed later through the event bridge and [`reap`].
    ///
    /// [`reap`]: LifecycleController::reap
    pub fn terminate(&mut self, graceful: bool) -> Result<bool> {
        let Some(pid) = self.pid() else {
            return Ok(false);
        };

        let sig = if graceful { Signal::SIGTERM } else { Signal::SIGKILL };
        info!("Terminating worker (PID: {}) with {}", pid, sig);

        match signal::kill(Pid::from_raw(pid as i32), sig) {
            Ok(()) => {}
            Err(Errno::ESRCH) => debug!("Worker (PID: {}) already exited", pid),
            Err(e) => {
                return Err(BeaconError::SignalError(format!(
                    "Failed to send {} to worker (PID: {}): {}",
                    sig, pid, e
                )))
            }
        }

        self.state = ProcessState::Terminating;
        self.stop_deadline = if graceful {
            self.stop_deadline
                .or_else(|| Some(Instant::now() + self.config.stop_timeout()))
        } else {
            None
        };

        Ok(true)
    }

    /// Handle an exit reported by the OS
    ///
    /// Returns `true` when `pid` is the tracked worker, which is then forgotten
    /// and the state returns to idle. Exits of unrelated children are ignored.
    pub fn reap(&mut self, pid: u32) -> bool {
        if self.pid() != Some(pid) {
            return false;
        }

        if let Some(worker) = self.worker.take() {
            info!(
                "Worker (PID: {}) exited after {:?} in state {}",
                pid,
                worker.uptime(),
                self.state
            );
        }

        self.state = ProcessState::Idle;
        self.probe_after = None;
        self.stop_deadline = None;
        true
    }

    pub fn mark_healthy(&mut self, rtt: Duration) {
        self.state = ProcessState::Healthy;
        if let Some(worker) = self.worker.as_mut() {
            worker.last_rtt = Some(rtt);
        }
    }

    pub fn mark_unhealthy(&mut self) {
        self.state = ProcessState::Unhealthy;
    }

    /// Whether a probe should run at `now`
    pub fn probe_eligible(&self, now: Instant) -> bool {
        self.state.is_probe_eligible() && self.probe_after.map_or(true, |at| now >= at)
    }

    pub fn probe_after(&self) -> Option<Instant> {
        self.probe_after
    }

    /// Arrange a respawn once the restart delay has elapsed from `now`
    pub fn schedule_respawn(&mut self, now: Instant) {
        let at = now + self.config.restart_delay();
        debug!("Worker respawn scheduled in {:?}", self.config.restart_delay());
        self.respawn_at = Some(at);
    }

    pub fn respawn_due(&self, now: Instant) -> bool {
        self.state == ProcessState::Idle && self.respawn_at.is_some_and(|at| now >= at)
    }

    /// Send SIGKILL when a graceful stop has outlived the stop timeout
    pub fn escalate_if_overdue(&mut self, now: Instant) -> Result<bool> {
        match self.stop_deadline {
            Some(deadline) if self.state == ProcessState::Terminating && now >= deadline => {
                warn!(
                    "Worker did not exit within {:?}, sending SIGKILL",
                    self.config.stop_timeout()
                );
                self.terminate(false)
            }
            _ => Ok(false),
        }
    }

    /// Earliest pending timer: grace end, stop deadline or respawn
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        [
            self.probe_after.filter(|at| *at > now),
            self.stop_deadline,
            self.respawn_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }
}
