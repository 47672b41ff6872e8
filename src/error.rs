use crate::registry::CoordinationError;
use thiserror::Error;

/// Main error type for the beacon supervisor
#[derive(Debug, Error)]
pub enum BeaconError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // Worker process errors
    #[error("Failed to spawn worker: {0}")]
    SpawnError(String),

    #[error("Worker is in invalid state for this operation: {0}")]
    InvalidProcessState(String),

    #[error("Signal error: {0}")]
    SignalError(String),

    #[error("Worker exited ({0}) and keepalive is disabled")]
    WorkerExited(String),

    // Single-instance errors
    #[error("Supervisor already running (pid file {0} is locked)")]
    AlreadyRunning(String),

    #[error("PID file error: {0}")]
    PidFileError(String),

    // Coordination service errors
    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BeaconError {
    /// Process exit code reported to the operator for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BeaconError::ConfigError(_)
            | BeaconError::InvalidConfig(_)
            | BeaconError::MissingConfigField(_)
            | BeaconError::ConfigValidationError(_) => 2,
            BeaconError::AlreadyRunning(_) => 3,
            BeaconError::SpawnError(_) => 4,
            BeaconError::Coordination(_) => 5,
            _ => 1,
        }
    }
}

/// Result type alias for beacon operations
pub type Result<T> = std::result::Result<T, BeaconError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(BeaconError::MissingConfigField("bin".into()).exit_code(), 2);
        assert_eq!(BeaconError::AlreadyRunning("/tmp/x.pid".into()).exit_code(), 3);
        assert_eq!(BeaconError::SpawnError("nope".into()).exit_code(), 4);
        assert_eq!(
            BeaconError::Coordination(CoordinationError::NotConnected).exit_code(),
            5
        );
        assert_eq!(BeaconError::WorkerExited("exit status: 1".into()).exit_code(), 1);
    }
}
