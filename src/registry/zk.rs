use super::client::{CoordinationClient, CoordinationError};
use super::{SessionChange, SessionEvent};
use crate::events::EventSender;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use zookeeper::{Acl, CreateMode, KeeperState, WatchedEvent, ZkError, ZooKeeper};

/// [`CoordinationClient`] backed by a ZooKeeper ensemble
///
/// The `zookeeper` crate's calls block, so each one runs on tokio's blocking
/// pool. Session notifications arrive on the client's own thread through the
/// default watcher and are posted to the event bridge, never handled inline.
pub struct ZkClient {
    hosts: String,
    session_timeout: Duration,
    events: EventSender,
    generation: u64,
    handle: Option<Arc<ZooKeeper>>,
}

impl ZkClient {
    pub fn new(hosts: impl Into<String>, session_timeout: Duration, events: EventSender) -> Self {
        Self {
            hosts: hosts.into(),
            session_timeout,
            events,
            generation: 0,
            handle: None,
        }
    }

    fn handle(&self) -> Result<Arc<ZooKeeper>, CoordinationError> {
        self.handle.clone().ok_or(CoordinationError::NotConnected)
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, CoordinationError>
    where
        T: Send + 'static,
        F: FnOnce(&ZooKeeper) -> Result<T, ZkError> + Send + 'static,
    {
        let zk = self.handle()?;
        tokio::task::spawn_blocking(move || op(&zk))
            .await
            .map_err(|e| CoordinationError::Transient(format!("client task failed: {}", e)))?
            .map_err(map_error)
    }
}

fn map_error(error: ZkError) -> CoordinationError {
    match error {
        ZkError::NoNode => CoordinationError::NoNode,
        ZkError::NodeExists => CoordinationError::NodeExists,
        ZkError::SessionExpired | ZkError::AuthFailed => {
            CoordinationError::SessionInvalid(format!("{:?}", error))
        }
        other => CoordinationError::Transient(format!("{:?}", other)),
    }
}

fn session_change(state: KeeperState) -> Option<SessionChange> {
    match state {
        KeeperState::SyncConnected | KeeperState::ConnectedReadOnly => {
            Some(SessionChange::Connected)
        }
        KeeperState::Disconnected => Some(SessionChange::Disconnected),
        KeeperState::Expired | KeeperState::AuthFailed => Some(SessionChange::Expired),
        _ => None,
    }
}

#[async_trait]
impl CoordinationClient for ZkClient {
    async fn connect(&mut self) -> Result<(), CoordinationError> {
        self.close().await;
        self.generation += 1;

        let generation = self.generation;
        let hosts = self.hosts.clone();
        let timeout = self.session_timeout;
        let events = self.events.clone();

        let watcher = move |event: WatchedEvent| {
            debug!(
                "ZooKeeper event {:?} (state {:?}, generation {})",
                event.event_type, event.keeper_state, generation
            );
            if let Some(change) = session_change(event.keeper_state) {
                events.session(SessionEvent { generation, change });
            }
        };

        let zk = tokio::task::spawn_blocking(move || ZooKeeper::connect(&hosts, timeout, watcher))
            .await
            .map_err(|e| CoordinationError::Transient(format!("connect task failed: {}", e)))?
            .map_err(|e| CoordinationError::Transient(format!("connect failed: {:?}", e)))?;

        self.handle = Some(Arc::new(zk));
        Ok(())
    }

    async fn get_data(&self, path: &str) -> Result<Vec<u8>, CoordinationError> {
        let path = path.to_string();
        self.blocking(move |zk| zk.get_data(&path, false).map(|(data, _)| data))
            .await
    }

    async fn create_ephemeral(&self, path: &str, data: &[u8]) -> Result<(), CoordinationError> {
        let path = path.to_string();
        let data = data.to_vec();
        self.blocking(move |zk| {
            zk.create(&path, data, Acl::read_unsafe().clone(), CreateMode::Ephemeral)
                .map(|_| ())
        })
        .await
    }

    async fn delete(&self, path: &str) -> Result<(), CoordinationError> {
        let path = path.to_string();
        self.blocking(move |zk| zk.delete(&path, None)).await
    }

    async fn close(&mut self) {
        if let Some(zk) = self.handle.take() {
            let result = tokio::task::spawn_blocking(move || zk.close()).await;
            if let Ok(Err(e)) = result {
                warn!("Failed to close ZooKeeper session: {:?}", e);
            }
        }
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}
