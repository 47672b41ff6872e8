use crate::config::WorkerConfig;
use crate::error::{BeaconError, Result};
use crate::events::EventSender;
use std::process::Stdio;
use tokio::process::Command;
use tracing::warn;

/// Metadata returned when spawning the worker
#[derive(Debug)]
pub struct SpawnedWorker {
    /// Process ID assigned by the OS
    pub pid: u32,
}

/// Spawn the worker binary with its config file as the only argument
///
/// The child is placed in its own process group so terminal signals reach the
/// supervisor only. Ownership of the child handle moves into a detached reaper
/// task: when the OS reports the exit, the task posts `Event::ChildExited` and
/// the supervisor handles it from its own loop. The task ends with the child.
///
/// Must be called from within a tokio runtime.
pub fn spawn_worker(config: &WorkerConfig, events: &EventSender) -> Result<SpawnedWorker> {
    let mut command = Command::new(&config.bin);
    command
        .arg(&config.conf)
        .stdin(Stdio::null())
        .process_group(0)
        .kill_on_drop(false);

    let mut child = command.spawn().map_err(|e| {
        BeaconError::SpawnError(format!("{}: {}", config.bin.display(), e))
    })?;

    let pid = child.id().ok_or_else(|| {
        BeaconError::SpawnError(format!(
            "{} exited before its pid could be read",
            config.bin.display()
        ))
    })?;

    let sender = events.clone();
    tokio::spawn(async move {
        let status = match child.wait().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Failed to wait for worker (PID: {}): {}", pid, e);
                None
            }
        };
        sender.child_exited(pid, status);
    });

    Ok(SpawnedWorker { pid })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{self, Event};
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_posts_exit() {
        let (tx, mut rx) = events::channel();
        let config = WorkerConfig::new("/bin/sh", "-c");

        // `sh -c` with no command string fails immediately with a usage error
        let spawned = spawn_worker(&config, &tx).unwrap();
        assert!(spawned.pid > 0);

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();

        match event {
            Event::ChildExited { pid, status } => {
                assert_eq!(pid, spawned.pid);
                assert!(status.is_some());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exit_posted_after_worker_handle_dropped() {
        let (tx, mut rx) = events::channel();
        let config = WorkerConfig::new("/bin/sleep", "0.2");

        let pid = spawn_worker(&config, &tx).unwrap().pid;

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();

        match event {
            Event::ChildExited { pid: exited, status } => {
                assert_eq!(exited, pid);
                assert!(status.unwrap().success());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let (tx, _rx) = events::channel();
        let config = WorkerConfig::new("/nonexistent/worker-binary", "worker.conf");

        let result = spawn_worker(&config, &tx);
        assert!(matches!(result, Err(BeaconError::SpawnError(_))));
    }
}
