use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Tunables for the background daemon. Missing keys fall back to defaults, so
/// older settings files keep loading as fields are added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DaemonSettings {
    pub topology_poll_ms: u64,
    pub snapshot_interval_secs: u64,
    pub time_tick_secs: u64,
    /// Upper bound for one blocking OS query (enumeration, desktop listing).
    pub capture_timeout_secs: u64,
    /// Extra executable names never captured, on top of the built-in denylist.
    pub excluded_exes: Vec<String>,
    /// Browser used when restoring tabs; discovered when unset.
    pub browser_path: Option<String>,
    /// Whether `restore` creates a fresh desktop unless told otherwise.
    pub restore_new_desktop: bool,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            topology_poll_ms: 500,
            snapshot_interval_secs: 30,
            time_tick_secs: 60,
            capture_timeout_secs: 10,
            excluded_exes: Vec::new(),
            browser_path: None,
            restore_new_desktop: true,
        }
    }
}

impl DaemonSettings {
    pub fn topology_poll(&self) -> Duration {
        Duration::from_millis(self.topology_poll_ms)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    pub fn time_tick(&self) -> Duration {
        Duration::from_secs(self.time_tick_secs)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.topology_poll_ms == 0 {
            bail!("topologyPollMs must be greater than zero");
        }
        if self.snapshot_interval_secs == 0 || self.time_tick_secs == 0 {
            bail!("snapshot and time intervals must be greater than zero");
        }
        if self.capture_timeout_secs == 0 {
            bail!("captureTimeoutSecs must be greater than zero");
        }
        Ok(())
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<DaemonSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            read_settings(&path)?
        } else {
            DaemonSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn daemon(&self) -> DaemonSettings {
        self.read().clone()
    }

    pub fn update_daemon(&self, settings: DaemonSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.write();
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn reload(&self) -> Result<()> {
        let data = read_settings(&self.path)?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &DaemonSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, DaemonSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, DaemonSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn read_settings(path: &Path) -> Result<DaemonSettings> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    match serde_json::from_str::<DaemonSettings>(&contents) {
        Ok(settings) if settings.validate().is_ok() => Ok(settings),
        Ok(_) | Err(_) => {
            log::warn!(
                "ignoring unreadable settings at {}, using defaults",
                path.display()
            );
            Ok(DaemonSettings::default())
        }
    }
}
