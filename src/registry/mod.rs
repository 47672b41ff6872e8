//! Registration of the worker's liveness in a coordination service.
//!
//! A healthy worker is advertised by an ephemeral node whose content is the
//! configured payload. The [`Registrar`] converges the service's view to the
//! [`RegistrationIntent`] derived from the current process and session state.

mod client;
mod coordinated;
#[cfg(test)]
pub(crate) mod memory;
mod standalone;
mod zk;

pub use client::{CoordinationClient, CoordinationError};
pub use coordinated::CoordinatedRegistrar;
pub use standalone::StandaloneRegistrar;
pub use zk::ZkClient;

use crate::config::SupervisorConfig;
use crate::error::Result;
use crate::events::EventSender;
use crate::process::ProcessState;
use async_trait::async_trait;

/// The registrar's view of its coordination session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinationState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for CoordinationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinationState::Disconnected => write!(f, "disconnected"),
            CoordinationState::Connecting => write!(f, "connecting"),
            CoordinationState::Connected => write!(f, "connected"),
        }
    }
}

/// A session transition reported by the coordination client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    Connected,
    Disconnected,
    /// The session is gone for good and must be re-established
    Expired,
}

/// A session notification, tagged with the connect generation that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEvent {
    pub generation: u64,
    pub change: SessionChange,
}

/// Whether the registration node should exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationIntent {
    Present,
    Absent,
}

impl RegistrationIntent {
    /// `Present` iff the worker is healthy and the session is connected
    pub fn derive(process: ProcessState, coordination: CoordinationState) -> Self {
        if process == ProcessState::Healthy && coordination == CoordinationState::Connected {
            RegistrationIntent::Present
        } else {
            RegistrationIntent::Absent
        }
    }
}

/// What a sync did to the coordination service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Observed state already matched the intent
    Unchanged,
    Created,
    Removed,
    /// Nothing could be done now; the next sync retries
    Deferred,
}

/// Keeps the registration node in step with worker health
#[async_trait]
pub trait Registrar: Send {
    fn coordination_state(&self) -> CoordinationState;

    /// Open the coordination session; failure here is fatal at startup
    async fn connect(&mut self) -> Result<()>;

    /// Converge the registration node to the intent derived from `process`
    ///
    /// Idempotent: with unchanged intent a second call performs no mutation.
    async fn sync(&mut self, process: ProcessState) -> SyncOutcome;

    /// Apply a session notification; entering `Connected` triggers a sync
    async fn session_changed(&mut self, event: SessionEvent, process: ProcessState)
        -> SyncOutcome;

    /// Close the session, removing the ephemeral node with it
    async fn close(&mut self);
}

/// Pick the registrar for `config`: ZooKeeper-backed or standalone
pub fn build_registrar(config: &SupervisorConfig, events: EventSender) -> Box<dyn Registrar> {
    match config.coordination {
        Some(ref coordination) => {
            let client = ZkClient::new(
                coordination.hosts.clone(),
                coordination.session_timeout(),
                events,
            );
            Box::new(CoordinatedRegistrar::new(
                client,
                coordination.node_path(),
                coordination.node_data(),
            ))
        }
        None => Box::new(StandaloneRegistrar),
    }
}
