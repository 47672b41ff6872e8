//! The supervision loop.
//!
//! [`Supervisor`] is the single owner of all supervision state: the worker's
//! lifecycle, the health monitor and the registrar. It probes on a fixed tick,
//! acts on the verdict and drains the notification bridge between ticks, so
//! every state transition and every registration sync runs on one logical
//! thread.

use crate::config::SupervisorConfig;
use crate::error::{BeaconError, Result};
use crate::events::{Event, EventReceiver, EventSender};
use crate::health::{HealthMonitor, Verdict};
use crate::process::{LifecycleController, ProcessState};
use crate::registry::{CoordinationState, Registrar};
use std::process::ExitStatus;
use std::time::Instant;
use tracing::{debug, info, warn};


/// What the loop should do after handling an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Why the loop woke up
enum Wake {
    Event(Event),
    Timer,
}

/// Orchestrates one worker: spawn, probe, register, restart, shut down
pub struct Supervisor {
    config: SupervisorConfig,
    lifecycle: LifecycleController,
    monitor: HealthMonitor,
    registrar: Box<dyn Registrar>,
    events: EventReceiver,
    shutting_down: bool,
}

impl Supervisor {
    /// `sender` must be the posting side of `events`; the worker's reaper
    /// tasks report exits through it.
    pub fn new(
        config: SupervisorConfig,
        registrar: Box<dyn Registrar>,
        sender: EventSender,
        events: EventReceiver,
    ) -> Self {
        let lifecycle = LifecycleController::new(config.worker.clone(), sender);
        let monitor = HealthMonitor::new(&config.worker, &config.health);

        Self {
            config,
            lifecycle,
            monitor,
            registrar,
            events,
            shutting_down: false,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.lifecycle.state()
    }

    pub fn coordination_state(&self) -> CoordinationState {
        self.registrar.coordination_state()
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Supervise until a shutdown request or a fatal error
    ///
    /// Returns `Ok(())` after a graceful shutdown. Fatal errors (coordination
    /// connect, spawn failure, worker exit with keepalive disabled) still stop
    /// the worker and close the coordination session before being returned.
    pub async fn run(&mut self) -> Result<()> {
        if let Err(e) = self.start().await {
            self.registrar.close().await;
            return Err(e);
        }

        match self.supervise().await {
            Ok(()) => self.shutdown().await,
            Err(e) => {
                if let Err(stop_err) = self.shutdown().await {
                    warn!("Failed to stop worker after error: {}", stop_err);
                }
                Err(e)
            }
        }
    }

    async fn start(&mut self) -> Result<()> {
        self.registrar.connect().await?;
        self.lifecycle.spawn()?;
        self.registrar.sync(self.lifecycle.state()).await;
        Ok(())
    }

    async fn supervise(&mut self) -> Result<()> {
        let interval = self.config.health.ping_interval();
        let mut next_tick = Instant::now() + interval;

        info!(
            "Supervising {} on {} (ping every {:?})",
            self.config.worker.bin.display(),
            self.config.worker.address(),
            interval
        );

        loop {
            self.service_timers(Instant::now()).await?;

            if Instant::now() >= next_tick {
                self.tick().await?;
                next_tick = Instant::now() + interval;
            }

            let wake_at = self
                .lifecycle
                .next_deadline(Instant::now())
                .map_or(next_tick, |at| at.min(next_tick));

            if let Wake::Event(event) = self.wait_until(wake_at).await {
                if self.handle_event(event).await? == Flow::Stop {
                    return Ok(());
                }
            }
        }
    }

    /// Sleep until `deadline` unless an event arrives first
    async fn wait_until(&mut self, deadline: Instant) -> Wake {
        let deadline = tokio::time::Instant::from_std(deadline);
        tokio::select! {
            event = self.events.recv() => match event {
                Some(event) => Wake::Event(event),
                None => {
                    tokio::time::sleep_until(deadline).await;
                    Wake::Timer
                }
            },
            _ = tokio::time::sleep_until(deadline) => Wake::Timer,
        }
    }

    /// One health-check round followed by a registration sync
    async fn tick(&mut self) -> Result<()> {
        if self.lifecycle.probe_eligible(Instant::now()) {
            let (verdict, rtt) = self.monitor.check().await;
            match verdict {
                Verdict::Healthy => {
                    if let Some(rtt) = rtt {
                        self.lifecycle.mark_healthy(rtt);
                    }
                }
                Verdict::Degraded { failures } => {
                    debug!("Worker degraded, {} consecutive failures", failures);
                }
                Verdict::Restart => self.restart_worker().await?,
            }
        } else {
            debug!("Skipping probe, worker is {}", self.lifecycle.state());
        }

        self.registrar.sync(self.lifecycle.state()).await;
        Ok(())
    }

    /// Pull the registration, then stop the worker; the respawn follows its reap
    async fn restart_worker(&mut self) -> Result<()> {
        self.lifecycle.mark_unhealthy();
        self.registrar.sync(self.lifecycle.state()).await;
        self.monitor.disconnect();
        self.lifecycle.terminate(true)?;
        Ok(())
    }

    /// Fire the stop escalation and keepalive respawn when they are due
    async fn service_timers(&mut self, now: Instant) -> Result<()> {
        self.lifecycle.escalate_if_overdue(now)?;

        if self.lifecycle.respawn_due(now) {
            self.lifecycle.spawn()?;
            self.monitor.reset();
            self.registrar.sync(self.lifecycle.state()).await;
        }

        Ok(())
    }

    async fn handle_event(&mut self, event: Event) -> Result<Flow> {
        match event {
            Event::ChildExited { pid, status } => {
                self.child_exited(pid, status).await?;
                Ok(Flow::Continue)
            }
            Event::Shutdown { signal } => {
                if self.shutting_down {
                    debug!("Ignoring {}, already shutting down", signal);
                    return Ok(Flow::Continue);
                }
                info!("Received {}, shutting down", signal);
                self.shutting_down = true;
                Ok(Flow::Stop)
            }
            Event::Session(event) => {
                self.registrar
                    .session_changed(event, self.lifecycle.state())
                    .await;
                Ok(Flow::Continue)
            }
        }
    }

    async fn child_exited(&mut self, pid: u32, status: Option<ExitStatus>) -> Result<()> {
        if !self.lifecycle.reap(pid) {
            debug!("Ignoring exit of untracked child (PID: {})", pid);
            return Ok(());
        }

        self.monitor.disconnect();
        self.monitor.reset();
        self.registrar.sync(self.lifecycle.state()).await;

        if self.shutting_down {
            return Ok(());
        }

        let status = describe(status);
        if !self.lifecycle.keepalive() {
            return Err(BeaconError::WorkerExited(status));
        }

        warn!(
            "Worker (PID: {}) exited ({}), respawning in {:?}",
            pid,
            status,
            self.config.worker.restart_delay()
        );
        self.lifecycle.schedule_respawn(Instant::now());
        Ok(())
    }

    /// Stop the worker and drop the registration
    ///
    /// Keepalive is switched off first so the exit is not answered with a
    /// respawn. With no worker tracked this returns at once.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.shutting_down = true;
        self.lifecycle.disable_keepalive();

        if self.lifecycle.terminate(true)? {
            self.registrar.sync(self.lifecycle.state()).await;
            self.await_worker_exit().await?;
        } else {
            self.registrar.sync(self.lifecycle.state()).await;
        }

        self.registrar.close().await;
        info!("Supervisor stopped");
        Ok(())
    }

    async fn await_worker_exit(&mut self) -> Result<()> {
        let mut killed = false;

        while self.lifecycle.pid().is_some() {
            let now = Instant::now();
            killed |= self.lifecycle.escalate_if_overdue(now)?;

            let wake_at = self
                .lifecycle
                .next_deadline(now)
                .unwrap_or(now + self.config.worker.stop_timeout());

            match self.wait_until(wake_at).await {
                Wake::Event(event) => {
                    self.handle_event(event).await?;
                }
                Wake::Timer if killed => {
                    warn!(
                        "Worker (PID: {:?}) still running after SIGKILL, giving up",
                        self.lifecycle.pid()
                    );
                    break;
                }
                Wake::Timer => {}
            }
        }

        Ok(())
    }
}

fn describe(status: Option<ExitStatus>) -> String {
    status.map_or_else(|| "status unknown".to_string(), |s| s.to_string())
}
