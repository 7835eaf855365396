//! PID file for the foreground worker process.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub(crate) enum PidError {
    #[error("Workers already running (PID file: {path}, PID: {pid})")]
    AlreadyRunning { path: PathBuf, pid: u32 },

    #[error("Failed to write PID file at {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("Failed to read PID file at {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to remove PID file at {path}: {reason}")]
    Remove { path: PathBuf, reason: String },
}

/// Guards against two `worker start` processes sharing one store.
#[derive(Debug)]
pub(crate) struct PidFile {
    path: PathBuf,
    locked: bool,
}

impl PidFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            locked: false,
        }
    }

    /// PID file for the store at `store_path`.
    pub fn for_store(store_path: &Path) -> Self {
        let mut name = store_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "queuectl".into());
        name.push(".pid");
        Self::new(store_path.with_file_name(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_pid(&self) -> Result<Option<u32>, PidError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PidError::Read {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })
            }
        };

        let pid = contents.trim().parse::<u32>().map_err(|e| PidError::Read {
            path: self.path.clone(),
            reason: format!("Invalid PID format: {}", e),
        })?;
        Ok(Some(pid))
    }

    /// PID of a live worker process, if any. Stale files are ignored.
    pub fn running_pid(&self) -> Result<Option<u32>, PidError> {
        Ok(self.read_pid()?.filter(|pid| is_process_running(*pid)))
    }

    /// Record this process, refusing if another live process holds the file.
    pub fn try_acquire(&mut self) -> Result<(), PidError> {
        if let Some(existing) = self.read_pid()? {
            if is_process_running(existing) {
                return Err(PidError::AlreadyRunning {
                    path: self.path.clone(),
                    pid: existing,
                });
            }
            warn!(
                "Removing stale PID file (PID {} not running): {}",
                existing,
                self.path.display()
            );
        }

        self.write_pid_value(std::process::id())
    }

    fn write_pid_value(&mut self, pid: u32) -> Result<(), PidError> {
        let write_error = |reason: String| PidError::Write {
            path: self.path.clone(),
            reason,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| write_error(e.to_string()))?;
        write!(file, "{}", pid).map_err(|e| write_error(e.to_string()))?;

        self.locked = true;
        debug!("PID file created: {} (PID: {})", self.path.display(), pid);
        Ok(())
    }

    pub fn release(&mut self) -> Result<(), PidError> {
        if !self.locked {
            return Ok(());
        }
        self.locked = false;

        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("PID file removed: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PidError::Remove {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to remove PID file on drop: {}", e);
        }
    }
}

#[cfg(unix)]
pub(crate) fn is_process_running(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Signal 0 only checks for existence. EPERM means the process exists
    // but belongs to another user.
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub(crate) fn is_process_running(_pid: u32) -> bool {
    true
}

/// Ask the process to shut down gracefully.
#[cfg(unix)]
pub(crate) fn request_shutdown(pid: u32) -> anyhow::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|e| anyhow::anyhow!("Failed to send SIGTERM to PID {}: {}", pid, e))?;
    info!("Sent SIGTERM to PID {}", pid);
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn request_shutdown(_pid: u32) -> anyhow::Result<()> {
    anyhow::bail!("Signal sending not supported on this platform")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_pid_file() -> (TempDir, PidFile) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.pid");
        (dir, PidFile::new(path))
    }

    #[test]
    fn test_for_store() {
        let pid = PidFile::for_store(Path::new("data/db.json"));
        assert_eq!(pid.path(), Path::new("data/db.json.pid"));
    }

    #[test]
    fn test_missing_file_reads_none() {
        let (_dir, pid) = temp_pid_file();
        assert!(pid.read_pid().unwrap().is_none());
        assert!(pid.running_pid().unwrap().is_none());
    }

    #[test]
    fn test_acquire_and_release() {
        let (_dir, mut pid) = temp_pid_file();
        pid.try_acquire().unwrap();
        assert_eq!(pid.read_pid().unwrap(), Some(std::process::id()));

        pid.release().unwrap();
        assert!(!pid.path().exists());
    }

    #[test]
    fn test_acquire_rejects_live_process() {
        let (_dir, mut first) = temp_pid_file();
        first.try_acquire().unwrap();

        let mut second = PidFile::new(first.path());
        let result = second.try_acquire();
        assert!(matches!(result, Err(PidError::AlreadyRunning { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_acquire_replaces_stale_file() {
        let (_dir, mut pid) = temp_pid_file();
        // Above the largest pid_max Linux allows.
        fs::write(pid.path(), "999999999").unwrap();
        assert!(pid.running_pid().unwrap().is_none());

        pid.try_acquire().unwrap();
        assert_eq!(pid.read_pid().unwrap(), Some(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn test_foreign_process_counts_as_running() {
        // PID 1 always exists; unprivileged callers get EPERM for it.
        assert!(is_process_running(1));
    }

    #[test]
    fn test_invalid_contents() {
        let (_dir, pid) = temp_pid_file();
        fs::write(pid.path(), "not-a-pid").unwrap();
        assert!(matches!(pid.read_pid(), Err(PidError::Read { .. })));
    }

    #[test]
    fn test_drop_removes_file() {
        let (_dir, mut pid) = temp_pid_file();
        pid.try_acquire().unwrap();
        let path = pid.path().to_path_buf();
        drop(pid);
        assert!(!path.exists());
    }
}
