// PID file locking for single-instance enforcement

use crate::error::{BeaconError, Result};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// An exclusively locked PID file holding the supervisor's own process id
///
/// The advisory lock lives as long as this value. A second supervisor pointed
/// at the same path fails in [`PidLock::acquire`] instead of supervising the
/// same worker twice.
pub struct PidLock {
    path: PathBuf,
    file: Flock<File>,
}

impl PidLock {
    /// Lock `path` and write the current process id into it
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // No truncation before the lock is held: the file may belong to a
        // running instance.
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o644)
            .open(&path)
            .map_err(|e| {
                BeaconError::PidFileError(format!("Failed to open {}: {}", path.display(), e))
            })?;

        let mut file = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(
            |(_, errno)| {
                if errno == Errno::EWOULDBLOCK {
                    BeaconError::AlreadyRunning(path.display().to_string())
                } else {
                    BeaconError::PidFileError(format!(
                        "Failed to lock {}: {}",
                        path.display(),
                        errno
                    ))
                }
            },
        )?;

        write_pid(&mut file).map_err(|e| {
            BeaconError::PidFileError(format!("Failed to write {}: {}", path.display(), e))
        })?;

        Ok(Self { path, file })
    }

    /// Remove the PID file, then drop the lock
    pub fn release(self) -> Result<()> {
        let result = fs::remove_file(&self.path).map_err(|e| {
            BeaconError::PidFileError(format!("Failed to remove {}: {}", self.path.display(), e))
        });
        drop(self.file);
        result
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_pid(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    file.sync_all()
}

/// Read the process id stored in a PID file
pub fn read_pid<P: AsRef<Path>>(path: P) -> Result<u32> {
    let content = fs::read_to_string(path.as_ref())
        .map_err(|e| BeaconError::PidFileError(format!("Failed to read PID file: {}", e)))?;

    content
        .trim()
        .parse::<u32>()
        .map_err(|e| BeaconError::PidFileError(format!("Invalid PID in file: {}", e)))
}
