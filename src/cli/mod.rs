// CLI module - flags, config merge and the supervisor entry point

use crate::config::{CoordinationConfig, LogLevel, SupervisorConfig, WorkerConfig};
use crate::daemon::PidLock;
use crate::error::{BeaconError, Result};
use crate::events;
use crate::logging;
use crate::registry::build_registrar;
use crate::supervisor::Supervisor;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{info, warn};

/// Beacon - keeps a key-value worker alive and advertises its health
#[derive(Parser, Debug)]
#[command(name = "beacond")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML or JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker executable
    #[arg(short = 'b', long, visible_alias = "redis-bin", required_unless_present = "config")]
    worker_bin: Option<PathBuf>,

    /// Worker configuration file, passed as the worker's only argument
    #[arg(short = 'c', long, visible_alias = "redis-conf", required_unless_present = "config")]
    worker_conf: Option<PathBuf>,

    /// Address the worker listens on
    #[arg(long)]
    worker_host: Option<IpAddr>,

    /// Port the worker listens on
    #[arg(short = 'r', long, visible_alias = "redis-port")]
    worker_port: Option<u16>,

    /// Seconds between health checks
    #[arg(short = 's', long, visible_alias = "redis-ping-interval")]
    ping_interval: Option<u64>,

    /// Respawn the worker when it exits
    #[arg(short = 'k', long)]
    keepalive: bool,

    /// Seconds to wait before a keepalive respawn
    #[arg(short = 'i', long)]
    keepalive_interval: Option<u64>,

    /// Milliseconds to wait for the PONG reply
    #[arg(long)]
    pong_timeout: Option<u64>,

    /// Consecutive failed checks that trigger a restart
    #[arg(long)]
    max_failures: Option<u32>,

    /// Milliseconds after spawn before the first check
    #[arg(long)]
    startup_grace: Option<u64>,

    /// Seconds to wait for a graceful worker exit before SIGKILL
    #[arg(long)]
    stop_timeout: Option<u64>,

    /// Milliseconds allowed for the health-check connect
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Coordination service connection string (host:port[,host:port...])
    #[arg(short = 'z', long, visible_alias = "zoo-host")]
    zk_host: Option<String>,

    /// Parent path of the registration node
    #[arg(short = 'p', long, visible_alias = "zoo-path")]
    zk_path: Option<String>,

    /// Name of the registration node
    #[arg(short = 'n', long, visible_alias = "zoo-nodename")]
    zk_nodename: Option<String>,

    /// Content of the registration node
    #[arg(short = 'd', long, visible_alias = "zoo-nodedata")]
    zk_nodedata: Option<String>,

    /// Coordination session timeout in milliseconds
    #[arg(short = 't', long, visible_alias = "zoo-timeout")]
    zk_timeout: Option<u64>,

    /// Log verbosity (RUST_LOG overrides it)
    #[arg(short = 'l', long, value_enum)]
    log_level: Option<LogLevel>,

    /// Single-instance lock file
    #[arg(long)]
    pid_file: Option<PathBuf>,
}

impl Cli {
    /// Run the supervisor until shutdown
    pub fn run() -> Result<()> {
        let cli = Cli::parse();
        let config = cli.into_config()?;

        logging::init(config.log_level);
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(supervise(config))
    }

    /// Build the configuration: the file first, then explicit flags on top
    pub fn into_config(self) -> Result<SupervisorConfig> {
        let mut config = match self.config {
            Some(ref path) => SupervisorConfig::from_file(path)?,
            None => {
                let bin = self
                    .worker_bin
                    .clone()
                    .ok_or_else(|| BeaconError::MissingConfigField("worker-bin".to_string()))?;
                let conf = self
                    .worker_conf
                    .clone()
                    .ok_or_else(|| BeaconError::MissingConfigField("worker-conf".to_string()))?;
                SupervisorConfig::new(WorkerConfig::new(bin, conf))
            }
        };

        let worker = &mut config.worker;
        if let Some(bin) = self.worker_bin {
            worker.bin = bin;
        }
        if let Some(conf) = self.worker_conf {
            worker.conf = conf;
        }
        if let Some(host) = self.worker_host {
            worker.host = host;
        }
        if let Some(port) = self.worker_port {
            worker.port = port;
        }
        if self.keepalive {
            worker.keepalive = true;
        }
        if let Some(delay) = self.keepalive_interval {
            worker.restart_delay_secs = delay;
        }
        if let Some(grace) = self.startup_grace {
            worker.startup_grace_ms = grace;
        }
        if let Some(timeout) = self.stop_timeout {
            worker.stop_timeout_secs = timeout;
        }

        let health = &mut config.health;
        if let Some(interval) = self.ping_interval {
            health.ping_interval_secs = interval;
        }
        if let Some(timeout) = self.pong_timeout {
            health.pong_timeout_ms = timeout;
        }
        if let Some(threshold) = self.max_failures {
            health.max_failures = threshold;
        }
        if self.connect_timeout.is_some() {
            health.connect_timeout_ms = self.connect_timeout;
        }

        config.coordination = merge_coordination(
            config.coordination.take(),
            CoordinationFlags {
                hosts: self.zk_host,
                path: self.zk_path,
                node_name: self.zk_nodename,
                payload: self.zk_nodedata,
                session_timeout_ms: self.zk_timeout,
            },
        )?;

        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(pid_file) = self.pid_file {
            config.pid_file = pid_file;
        }

        Ok(config)
    }
}

struct CoordinationFlags {
    hosts: Option<String>,
    path: Option<String>,
    node_name: Option<String>,
    payload: Option<String>,
    session_timeout_ms: Option<u64>,
}

/// Host, path and node name are all-or-nothing unless the file supplies them
fn merge_coordination(
    from_file: Option<CoordinationConfig>,
    flags: CoordinationFlags,
) -> Result<Option<CoordinationConfig>> {
    let mut coordination = match from_file {
        Some(coordination) => coordination,
        None => match (flags.hosts.clone(), flags.path.clone(), flags.node_name.clone()) {
            (None, None, None) => {
                if flags.payload.is_some() || flags.session_timeout_ms.is_some() {
                    warn!("Coordination flags ignored without zk-host, zk-path and zk-nodename");
                }
                return Ok(None);
            }
            (Some(hosts), Some(path), Some(node_name)) => CoordinationConfig {
                hosts,
                path,
                node_name,
                payload: crate::config::default_payload(),
                session_timeout_ms: crate::config::default_session_timeout(),
            },
            _ => {
                return Err(BeaconError::ConfigValidationError(
                    "zk-host, zk-path and zk-nodename must be given together".to_string(),
                ))
            }
        },
    };

    if let Some(hosts) = flags.hosts {
        coordination.hosts = hosts;
    }
    if let Some(path) = flags.path {
        coordination.path = path;
    }
    if let Some(node_name) = flags.node_name {
        coordination.node_name = node_name;
    }
    if let Some(payload) = flags.payload {
        coordination.payload = payload;
    }
    if let Some(timeout) = flags.session_timeout_ms {
        coordination.session_timeout_ms = timeout;
    }

    Ok(Some(coordination))
}

/// Signal handlers go in before the pid file appears, so anyone who sees the
/// pid file can stop the supervisor gracefully
async fn supervise(config: SupervisorConfig) -> Result<()> {
    let (sender, receiver) = events::channel();
    let _signals = events::listen_for_shutdown(sender.clone())?;

    let lock = PidLock::acquire(&config.pid_file)?;
    info!("Acquired {}", lock.path().display());

    let registrar = build_registrar(&config, sender.clone());
    let mut supervisor = Supervisor::new(config, registrar, sender, receiver);
    let result = supervisor.run().await;

    if let Err(e) = lock.release() {
        warn!("Failed to remove pid file: {}", e);
    }

    result
}
