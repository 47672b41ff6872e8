//! Notification bridge between asynchronous event sources and the supervisor.
//!
//! Child exits, OS shutdown signals and coordination session changes arrive on
//! threads and tasks the supervisor does not control. Their sources only post
//! an [`Event`] into a single-consumer queue; the supervisor drains the queue
//! from its own loop and is the only place where state is mutated.

use crate::registry::SessionEvent;
use std::process::ExitStatus;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// A notification posted to the supervisor loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The OS reaped a child process
    ChildExited {
        pid: u32,
        status: Option<ExitStatus>,
    },
    /// A shutdown was requested, carrying the signal name
    Shutdown { signal: &'static str },
    /// The coordination session changed state
    Session(SessionEvent),
}

/// Posting side of the bridge; cheap to clone and usable from any thread
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

/// Consuming side of the bridge, owned by the supervisor
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
}

/// Create a connected sender/receiver pair
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

impl EventSender {
    pub fn post(&self, event: Event) {
        // The receiver only disappears once the supervisor is exiting
        if self.tx.send(event).is_err() {
            debug!("Event dropped, supervisor loop has exited");
        }
    }

    pub fn child_exited(&self, pid: u32, status: Option<ExitStatus>) {
        self.post(Event::ChildExited { pid, status });
    }

    pub fn shutdown(&self, signal: &'static str) {
        self.post(Event::Shutdown { signal });
    }

    pub fn session(&self, event: SessionEvent) {
        self.post(Event::Session(event));
    }
}

impl EventReceiver {
    /// Wait for the next event
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take the next queued event without waiting
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

/// Forward SIGINT, SIGTERM, SIGHUP and SIGTSTP to the bridge as shutdown requests
///
/// Must be called from within a tokio runtime. Every delivery is forwarded;
/// the supervisor ignores repeats once a shutdown is underway.
#[cfg(unix)]
pub fn listen_for_shutdown(sender: EventSender) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigtstp = signal(SignalKind::from_raw(nix::libc::SIGTSTP))?;

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                Some(_) = sigint.recv() => "SIGINT",
                Some(_) = sigterm.recv() => "SIGTERM",
                Some(_) = sighup.recv() => "SIGHUP",
                Some(_) = sigtstp.recv() => "SIGTSTP",
                else => break,
            };
            debug!("Received {}", name);
            sender.shutdown(name);
        }
    }))
}
