use crate::error::{BeaconError, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default PID file location
pub const DEFAULT_PID_FILE: &str = "/tmp/beacond.pid";

/// Upper bound for every configured delay and timeout
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Complete supervisor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// The supervised worker process
    pub worker: WorkerConfig,

    /// Health-check protocol settings
    #[serde(default)]
    pub health: HealthConfig,

    /// Coordination service registration; standalone mode when absent
    #[serde(default)]
    pub coordination: Option<CoordinationConfig>,

    /// PID file guarding against a second supervisor instance
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    #[serde(default)]
    pub log_level: LogLevel,
}

/// Worker process settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Path to the worker executable
    pub bin: PathBuf,

    /// Path to the worker configuration file, passed as its only argument
    pub conf: PathBuf,

    /// Address the worker listens on for pings
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Respawn the worker after it exits or is killed
    #[serde(default)]
    pub keepalive: bool,

    /// Delay between a worker exit and its respawn (in seconds)
    #[serde(default = "default_restart_delay")]
    pub restart_delay_secs: u64,

    /// Delay after spawn before the first probe (in milliseconds)
    #[serde(default = "default_startup_grace")]
    pub startup_grace_ms: u64,

    /// Time allowed after SIGTERM before SIGKILL (in seconds)
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
}

/// Health monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_ms: u64,

    /// Consecutive failed probes that force a restart
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,

    /// Probe connect timeout; OS default when unset
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
}

/// Coordination service registration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Connection string, e.g. `zk1:2181,zk2:2181`
    pub hosts: String,

    /// Parent path of the registration node
    pub path: String,

    pub node_name: String,

    /// Content written into the ephemeral node; empty means the default
    #[serde(default = "default_payload")]
    pub payload: String,

    #[serde(default = "default_session_timeout")]
    pub session_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// Filter directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// Default value functions for serde
fn default_pid_file() -> PathBuf {
    PathBuf::from(DEFAULT_PID_FILE)
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

pub(crate) fn default_port() -> u16 {
    6379
}

pub(crate) fn default_restart_delay() -> u64 {
    1
}

pub(crate) fn default_startup_grace() -> u64 {
    1000
}

pub(crate) fn default_stop_timeout() -> u64 {
    10
}

pub(crate) fn default_ping_interval() -> u64 {
    5
}

pub(crate) fn default_pong_timeout() -> u64 {
    1000
}

pub(crate) fn default_max_failures() -> u32 {
    2
}

pub(crate) fn default_payload() -> String {
    "1".to_string()
}

pub(crate) fn default_session_timeout() -> u64 {
    5000
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval(),
            pong_timeout_ms: default_pong_timeout(),
            max_failures: default_max_failures(),
            connect_timeout_ms: None,
        }
    }
}

impl WorkerConfig {
    /// Worker config with defaults for everything but the two paths
    pub fn new(bin: impl Into<PathBuf>, conf: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            conf: conf.into(),
            host: default_host(),
            port: default_port(),
            keepalive: false,
            restart_delay_secs: default_restart_delay(),
            startup_grace_ms: default_startup_grace(),
            stop_timeout_secs: default_stop_timeout(),
        }
    }

    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        check_file(&self.bin, "worker binary", nix::unistd::AccessFlags::X_OK, "executable")?;
        check_file(&self.conf, "worker config", nix::unistd::AccessFlags::R_OK, "readable")?;

        if self.port == 0 {
            return Err(BeaconError::ConfigValidationError(
                "worker port must not be 0".to_string(),
            ));
        }

        if self.stop_timeout_secs == 0 {
            return Err(BeaconError::ConfigValidationError(
                "stop_timeout_secs must be at least 1".to_string(),
            ));
        }

        check_duration("restart_delay_secs", self.restart_delay())?;
        check_duration("startup_grace_ms", self.startup_grace())?;
        check_duration("stop_timeout_secs", self.stop_timeout())

    }
}

impl HealthConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    fn validate(&self) -> Result<()> {
        if self.ping_interval_secs == 0 {
            return Err(BeaconError::ConfigValidationError(
                "ping_interval_secs must be at least 1".to_string(),
            ));
        }

        if self.pong_timeout_ms == 0 {
            return Err(BeaconError::ConfigValidationError(
                "pong_timeout_ms must be at least 1".to_string(),
            ));
        }

        if self.max_failures == 0 {
            return Err(BeaconError::ConfigValidationError(
                "max_failures must be at least 1".to_string(),
            ));
        }

        if self.connect_timeout_ms == Some(0) {
            return Err(BeaconError::ConfigValidationError(
                "connect_timeout_ms must be at least 1 when set".to_string(),
            ));
        }

        check_duration("ping_interval_secs", self.ping_interval())?;
        check_duration("pong_timeout_ms", self.pong_timeout())?;
        match self.connect_timeout() {
            Some(timeout) => check_duration("connect_timeout_ms", timeout),
            None => Ok(()),
        }
    }
}

impl CoordinationConfig {
    /// Full path of the ephemeral registration node
    pub fn node_path(&self) -> String {
        format!("{}/{}", self.path.trim_end_matches('/'), self.node_name)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    /// Bytes stored in the node; an empty payload falls back to "1"
    pub fn node_data(&self) -> Vec<u8> {
        if self.payload.is_empty() {
            default_payload().into_bytes()
        } else {
            self.payload.as_bytes().to_vec()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.hosts.trim().is_empty() {
            return Err(BeaconError::MissingConfigField("coordination.hosts".to_string()));
        }

        if !self.path.starts_with('/') {
            return Err(BeaconError::ConfigValidationError(format!(
                "coordination path must be absolute: {}",
                self.path
            )));
        }

        if self.node_name.is_empty() {
            return Err(BeaconError::MissingConfigField(
                "coordination.node_name".to_string(),
            ));
        }

        if self.node_name.contains('/') {
            return Err(BeaconError::ConfigValidationError(format!(
                "node name must not contain '/': {}",
                self.node_name
            )));
        }

        if self.session_timeout_ms == 0 {
            return Err(BeaconError::ConfigValidationError(
                "session_timeout_ms must be at least 1".to_string(),
            ));
        }

        check_duration("session_timeout_ms", self.session_timeout())
    }
}

impl SupervisorConfig {
    /// Standalone configuration with default health settings
    pub fn new(worker: WorkerConfig) -> Self {
        Self {
            worker,
            health: HealthConfig::default(),
            coordination: None,
            pid_file: default_pid_file(),
            log_level: LogLevel::default(),
        }
    }

    /// Load a supervisor configuration from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<SupervisorConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BeaconError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .map_err(|e| BeaconError::InvalidConfig(format!("Failed to parse TOML: {}", e))),
            "json" => serde_json::from_str(&contents)
                .map_err(|e| BeaconError::InvalidConfig(format!("Failed to parse JSON: {}", e))),
            _ => Err(BeaconError::InvalidConfig(format!(
                "Unsupported file format: {}. Use .toml or .json",
                extension
            ))),
        }
    }

    /// Validate the configuration before any worker is spawned
    pub fn validate(&self) -> Result<()> {
        self.worker.validate()?;
        self.health.validate()?;

        if let Some(ref coordination) = self.coordination {
            coordination.validate()?;
        }

        if self.pid_file.as_os_str().is_empty() {
            return Err(BeaconError::MissingConfigField("pid_file".to_string()));
        }

        Ok(())
    }
}

/// Deadlines are computed as `Instant::now() + duration`, which must not overflow
fn check_duration(field: &str, duration: Duration) -> Result<()> {
    if duration > MAX_DURATION {
        return Err(BeaconError::ConfigValidationError(format!(
            "{} must not exceed {} days",
            field,
            MAX_DURATION.as_secs() / 86_400
        )));
    }
    Ok(())
}

/// Checks that `path` names a regular file the current user can access with `mode`
fn check_file(
    path: &Path,
    what: &str,
    mode: nix::unistd::AccessFlags,
    adjective: &str,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(BeaconError::MissingConfigField(what.to_string()));
    }

    let metadata = std::fs::metadata(path).map_err(|e| {
        BeaconError::ConfigValidationError(format!("{} {}: {}", what, path.display(), e))
    })?;

    if !metadata.is_file() {
        return Err(BeaconError::ConfigValidationError(format!(
            "{} is not a regular file: {}",
            what,
            path.display()
        )));
    }

    nix::unistd::access(path, mode).map_err(|_| {
        BeaconError::ConfigValidationError(format!(
            "{} is not {}: {}",
            what,
            adjective,
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, mode: u32) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    fn valid_config(dir: &TempDir) -> SupervisorConfig {
        SupervisorConfig {
            worker: WorkerConfig::new(
                write_file(dir, "worker", 0o755),
                write_file(dir, "worker.conf", 0o644),
            ),
            health: HealthConfig::default(),
            coordination: None,
            pid_file: dir.path().join("beacond.pid"),
            log_level: LogLevel::default(),
        }
    }

    fn coordination() -> CoordinationConfig {
        CoordinationConfig {
            hosts: "127.0.0.1:2181".to_string(),
            path: "/redis".to_string(),
            node_name: "shard-1".to_string(),
            payload: default_payload(),
            session_timeout_ms: default_session_timeout(),
        }
    }

    #[test]
    fn test_defaults() {
        let worker = WorkerConfig::new("/bin/redis-server", "/etc/redis.conf");
        assert_eq!(worker.address().to_string(), "127.0.0.1:6379");
        assert!(!worker.keepalive);
        assert_eq!(worker.restart_delay(), Duration::from_secs(1));
        assert_eq!(worker.startup_grace(), Duration::from_millis(1000));

        let health = HealthConfig::default();
        assert_eq!(health.ping_interval(), Duration::from_secs(5));
        assert_eq!(health.pong_timeout(), Duration::from_millis(1000));
        assert_eq!(health.max_failures, 2);
        assert_eq!(health.connect_timeout(), None);

        assert_eq!(LogLevel::default(), LogLevel::Warn);
    }

    #[test]
    fn test_node_path() {
        let mut config = coordination();
        assert_eq!(config.node_path(), "/redis/shard-1");

        config.path = "/redis/".to_string();
        assert_eq!(config.node_path(), "/redis/shard-1");

        config.path = "/".to_string();
        assert_eq!(config.node_path(), "/shard-1");
    }

    #[test]
    fn test_validate_accepts_valid_config() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        assert!(config.validate().is_ok());

        config.coordination = Some(coordination());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_binary() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.worker.bin = dir.path().join("does-not-exist");

        let result = config.validate();
        assert!(matches!(result, Err(BeaconError::ConfigValidationError(_))));
    }

    #[test]
    fn test_validate_empty_binary_path() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.worker.bin = PathBuf::new();

        let result = config.validate();
        assert!(matches!(result, Err(BeaconError::MissingConfigField(_))));
    }

    #[test]
    fn test_validate_directory_is_not_a_binary() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.worker.bin = dir.path().to_path_buf();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_threshold() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.health.max_failures = 0;

        let result = config.validate();
        assert!(matches!(result, Err(BeaconError::ConfigValidationError(_))));
    }

    #[test]
    fn test_validate_relative_coordination_path() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        let mut coord = coordination();
        coord.path = "redis".to_string();
        config.coordination = Some(coord);

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_node_name_with_slash() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        let mut coord = coordination();
        coord.node_name = "a/b".to_string();
        config.coordination = Some(coord);

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unbounded_durations() {
        let dir = TempDir::new().unwrap();

        let mut config = valid_config(&dir);
        config.health.ping_interval_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(BeaconError::ConfigValidationError(_))));

        let mut config = valid_config(&dir);
        config.worker.restart_delay_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(BeaconError::ConfigValidationError(_))));

        let mut config = valid_config(&dir);
        config.worker.startup_grace_ms = u64::MAX;
        assert!(matches!(config.validate(), Err(BeaconError::ConfigValidationError(_))));

        let mut config = valid_config(&dir);
        config.worker.stop_timeout_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(BeaconError::ConfigValidationError(_))));

        let mut config = valid_config(&dir);
        config.health.connect_timeout_ms = Some(u64::MAX);
        assert!(matches!(config.validate(), Err(BeaconError::ConfigValidationError(_))));

        let mut config = valid_config(&dir);
        let mut coord = coordination();
        coord.session_timeout_ms = u64::MAX;
        config.coordination = Some(coord);
        assert!(matches!(config.validate(), Err(BeaconError::ConfigValidationError(_))));
    }

    #[test]
    fn test_validate_accepts_durations_at_the_bound() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.health.ping_interval_secs = MAX_DURATION.as_secs();
        config.worker.restart_delay_secs = MAX_DURATION.as_secs();

        assert!(config.validate().is_ok());
        assert!(std::time::Instant::now()
            .checked_add(config.health.ping_interval())
            .is_some());
    }

    #[test]
    fn test_empty_payload_uses_default() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        let mut coord = coordination();
        coord.payload = String::new();
        config.coordination = Some(coord.clone());

        assert!(config.validate().is_ok());
        assert_eq!(coord.node_data(), b"1".to_vec());

        coord.payload = "up".to_string();
        assert_eq!(coord.node_data(), b"up".to_vec());
    }

    #[test]
    fn test_parse_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("beacond.toml");
        fs::write(
            &path,
            r#"
pid_file = "/run/beacond.pid"
log_level = "info"

[worker]
bin = "/usr/bin/redis-server"
conf = "/etc/redis/redis.conf"
port = 7000
keepalive = true

[health]
ping_interval_secs = 2
max_failures = 3

[coordination]
hosts = "zk1:2181,zk2:2181"
path = "/redis"
node_name = "shard-1"
"#,
        )
        .unwrap();

        let config = SupervisorConfig::from_file(&path).unwrap();
        assert_eq!(config.pid_file, PathBuf::from("/run/beacond.pid"));
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.worker.port, 7000);
        assert!(config.worker.keepalive);
        assert_eq!(config.worker.restart_delay_secs, 1);
        assert_eq!(config.health.ping_interval_secs, 2);
        assert_eq!(config.health.max_failures, 3);
        assert_eq!(config.health.pong_timeout_ms, 1000);

        let coord = config.coordination.unwrap();
        assert_eq!(coord.payload, "1");
        assert_eq!(coord.node_path(), "/redis/shard-1");
    }

    #[test]
    fn test_parse_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("beacond.json");
        fs::write(
            &path,
            r#"{"worker": {"bin": "/usr/bin/redis-server", "conf": "/etc/redis.conf"}}"#,
        )
        .unwrap();

        let config = SupervisorConfig::from_file(&path).unwrap();
        assert_eq!(config.worker.port, 6379);
        assert!(config.coordination.is_none());
        assert_eq!(config.pid_file, PathBuf::from(DEFAULT_PID_FILE));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("beacond.yaml");
        fs::write(&path, "worker: {}").unwrap();

        let result = SupervisorConfig::from_file(&path);
        assert!(matches!(result, Err(BeaconError::InvalidConfig(_))));
    }
}
