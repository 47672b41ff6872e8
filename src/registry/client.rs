use async_trait::async_trait;
use thiserror::Error;

/// Failures reported by a coordination client
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("node does not exist")]
    NoNode,

    #[error("node already exists")]
    NodeExists,

    /// The session or handle is no longer usable; a reconnect is required
    #[error("session invalid: {0}")]
    SessionInvalid(String),

    #[error("not connected")]
    NotConnected,

    /// Connection loss, operation timeout and the like; retried on the next sync
    #[error("transient failure: {0}")]
    Transient(String),
}

/// The operations the registrar needs from a coordination service
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Open a new session
    ///
    /// Session state changes are reported asynchronously through the event
    /// bridge, tagged with the value [`generation`] returns afterwards.
    ///
    /// [`generation`]: CoordinationClient::generation
    async fn connect(&mut self) -> Result<(), CoordinationError>;

    /// Read a node's content
    async fn get_data(&self, path: &str) -> Result<Vec<u8>, CoordinationError>;

    /// Create an ephemeral node bound to the current session
    async fn create_ephemeral(&self, path: &str, data: &[u8]) -> Result<(), CoordinationError>;

    /// Delete a node regardless of its version
    async fn delete(&self, path: &str) -> Result<(), CoordinationError>;

    /// Close the current session, if any
    async fn close(&mut self);

    /// Identifies the current session; bumped by every `connect`
    fn generation(&self) -> u64;
}
