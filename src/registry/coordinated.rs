use super::client::{CoordinationClient, CoordinationError};
use super::{
    CoordinationState, Registrar, RegistrationIntent, SessionChange, SessionEvent, SyncOutcome,
};
use crate::error::Result;
use crate::process::ProcessState;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Registrar backed by a real coordination client
///
/// Failed calls are never retried inline. Transient errors wait for the next
/// sync; a session-invalidating error closes the handle and reconnects, and
/// the sync that follows the new session's `Connected` event finishes the job.
pub struct CoordinatedRegistrar<C: CoordinationClient> {
    client: C,
    node_path: String,
    payload: Vec<u8>,
    state: CoordinationState,
    /// Set when a reconnect attempt itself failed
    needs_connect: bool,
}

impl<C: CoordinationClient> CoordinatedRegistrar<C> {
    pub fn new(client: C, node_path: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            client,
            node_path: node_path.into(),
            payload,
            state: CoordinationState::Disconnected,
            needs_connect: false,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn node_path(&self) -> &str {
        &self.node_path
    }

    async fn register(&mut self) -> SyncOutcome {
        match self.client.get_data(&self.node_path).await {
            Ok(data) if data == self.payload => return SyncOutcome::Unchanged,
            Ok(data) => {
                info!(
                    "Replacing {} (content {:?})",
                    self.node_path,
                    String::from_utf8_lossy(&data)
                );
                match self.client.delete(&self.node_path).await {
                    Ok(()) | Err(CoordinationError::NoNode) => {}
                    Err(e) => return self.recover(e).await,
                }
            }
            Err(CoordinationError::NoNode) => {}
            Err(e) => return self.recover(e).await,
        }

        match self
            .client
            .create_ephemeral(&self.node_path, &self.payload)
            .await
        {
            Ok(()) => {
                info!("Registered {}", self.node_path);
                SyncOutcome::Created
            }
            Err(CoordinationError::NodeExists) => {
                warn!("{} was created by someone else; retrying on next sync", self.node_path);
                SyncOutcome::Deferred
            }
            Err(e) => self.recover(e).await,
        }
    }

    async fn unregister(&mut self) -> SyncOutcome {
        match self.client.get_data(&self.node_path).await {
            Ok(_) => {}
            Err(CoordinationError::NoNode) => return SyncOutcome::Unchanged,
            Err(e) => return self.recover(e).await,
        }

        match self.client.delete(&self.node_path).await {
            Ok(()) => {
                info!("Unregistered {}", self.node_path);
                SyncOutcome::Removed
            }
            Err(CoordinationError::NoNode) => SyncOutcome::Unchanged,
            Err(e) => self.recover(e).await,
        }
    }

    async fn recover(&mut self, error: CoordinationError) -> SyncOutcome {
        match error {
            CoordinationError::SessionInvalid(_) | CoordinationError::NotConnected => {
                warn!("Coordination {}, reconnecting", error);
                self.reconnect().await;
            }
            other => warn!(
                "Coordination call for {} failed: {}; retrying on next sync",
                self.node_path, other
            ),
        }
        SyncOutcome::Deferred
    }

    async fn reconnect(&mut self) {
        self.client.close().await;
        self.state = CoordinationState::Disconnected;

        match self.client.connect().await {
            Ok(()) => {
                self.state = CoordinationState::Connecting;
                self.needs_connect = false;
            }
            Err(e) => {
                warn!("Coordination reconnect failed: {}", e);
                self.needs_connect = true;
            }
        }
    }
}

#[async_trait]
impl<C: CoordinationClient> Registrar for CoordinatedRegistrar<C> {
    fn coordination_state(&self) -> CoordinationState {
        self.state
    }

    async fn connect(&mut self) -> Result<()> {
        self.client.connect().await?;
        self.state = CoordinationState::Connecting;
        info!("Connecting to coordination service for {}", self.node_path);
        Ok(())
    }

    async fn sync(&mut self, process: ProcessState) -> SyncOutcome {
        if self.needs_connect {
            self.reconnect().await;
        }

        if self.state != CoordinationState::Connected {
            // No session: nothing can be written, and an ephemeral node does
            // not outlive the session that created it.
            debug!(
                "Coordination {}, deferring sync of {}",
                self.state, self.node_path
            );
            return SyncOutcome::Deferred;
        }

        match RegistrationIntent::derive(process, self.state) {
            RegistrationIntent::Present => self.register().await,
            RegistrationIntent::Absent => self.unregister().await,
        }
    }

    async fn session_changed(
        &mut self,
        event: SessionEvent,
        process: ProcessState,
    ) -> SyncOutcome {
        if event.generation != self.client.generation() {
            debug!(
                "Ignoring {:?} from closed session generation {}",
                event.change, event.generation
            );
            return SyncOutcome::Unchanged;
        }

        match event.change {
            SessionChange::Connected => {
                let previous = self.state;
                self.state = CoordinationState::Connected;
                if previous == CoordinationState::Connected {
                    return SyncOutcome::Unchanged;
                }
                info!("Coordination session established");
                self.sync(process).await
            }
            SessionChange::Disconnected => {
                warn!("Coordination session disconnected");
                self.state = CoordinationState::Disconnected;
                SyncOutcome::Unchanged
            }
            SessionChange::Expired => {
                warn!("Coordination session expired, reconnecting");
                self.reconnect().await;
                SyncOutcome::Deferred
            }
        }
    }

    async fn close(&mut self) {
        self.client.close().await;
        self.state = CoordinationState::Disconnected;
        self.needs_connect = false;
    }
}
