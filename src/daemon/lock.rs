use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{info, warn};

use crate::platform::ProcessLookup;

pub const PID_FILE_NAME: &str = "daemon.pid";

/// Pid file marking a data directory as owned by a running daemon. The file
/// is removed when the lock drops.
#[derive(Debug)]
pub struct DaemonLock {
    path: PathBuf,
}

impl DaemonLock {
    pub fn acquire(data_dir: &Path, processes: &dyn ProcessLookup) -> Result<Self> {
        if let Some(pid) = running_daemon(data_dir, processes)? {
            bail!(
                "a desksession daemon is already running for {} (pid {pid})",
                data_dir.display()
            );
        }

        let path = data_dir.join(PID_FILE_NAME);
        fs::write(&path, std::process::id().to_string())
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("daemon lock held at {}", path.display());
        Ok(Self { path })
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!("failed to remove {}: {err}", self.path.display());
        }
    }
}

/// Pid of the live daemon owning `data_dir`, if any. Pid files left behind by
/// a crashed daemon are ignored.
pub fn running_daemon(data_dir: &Path, processes: &dyn ProcessLookup) -> Result<Option<u32>> {
    let path = data_dir.join(PID_FILE_NAME);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()))
        }
    };

    let Ok(pid) = raw.trim().parse::<u32>() else {
        warn!("ignoring malformed pid file {}", path.display());
        return Ok(None);
    };
    if processes.process_info(pid).is_none() {
        info!("ignoring stale pid file for exited daemon {pid}");
        return Ok(None);
    }
    Ok(Some(pid))
}
