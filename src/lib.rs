pub mod capture;
pub mod daemon;
pub mod db;
pub mod events;
pub mod lifecycle;
pub mod platform;
pub mod restore;
pub mod settings;
pub mod topology;
mod utils;

#[cfg(test)]
mod test_support;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use capture::NoTabSource;
use daemon::{handle_line, running_daemon, DaemonController, DaemonLock};
use db::Database;
use events::EventBus;
use lifecycle::SessionManager;
use platform::Platform;
use restore::{ProcessLauncher, RestoreEngine};
use settings::{SettingsStore, SETTINGS_FILE_NAME};
use topology::SuppressHandle;

pub const DATA_DIR_ENV: &str = "DESKSESSION_DATA_DIR";
pub const DEBUG_ENV: &str = "DESKSESSION_DEBUG";
pub const DATABASE_FILE_NAME: &str = "desksession.sqlite3";

/// Reads `RUST_LOG`; `DESKSESSION_DEBUG=1` raises the default to debug.
pub fn init_logging() {
    let level = if std::env::var(DEBUG_ENV).is_ok_and(|value| value == "1") {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}

pub fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|dir| dir.join("desksession"))
        .ok_or_else(|| anyhow!("no data directory for this user; set {DATA_DIR_ENV}"))
}

/// Everything a daemon or a one-shot command needs, wired together.
pub struct App {
    data_dir: PathBuf,
    pub db: Database,
    pub settings: SettingsStore,
    pub manager: SessionManager,
    pub suppress: SuppressHandle,
    pub events: EventBus,
}

impl App {
    pub fn open(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let db = Database::new(data_dir.join(DATABASE_FILE_NAME))?;
        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE_NAME))?;
        let events = EventBus::new();
        let manager = SessionManager::new(
            db.clone(),
            Platform::native(),
            Arc::new(NoTabSource),
            events.clone(),
            &settings.daemon(),
        );

        Ok(Self {
            data_dir,
            db,
            settings,
            manager,
            suppress: SuppressHandle::new(),
            events,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Pid of a daemon already tracking this data directory.
    pub fn running_daemon(&self) -> Result<Option<u32>> {
        running_daemon(&self.data_dir, self.manager.platform().processes.as_ref())
    }

    /// Actions that create desktops or change bindings must go through a
    /// running daemon, which owns the suppress counter and the binding map.
    pub fn ensure_no_daemon(&self, command: &str) -> Result<()> {
        if let Some(pid) = self.running_daemon()? {
            bail!(
                "a desksession daemon (pid {pid}) is tracking {}; send {{\"command\":\"{command}\",...}} on its stdin instead",
                self.data_dir.display()
            );
        }
        Ok(())
    }

    pub fn restore_engine(&self) -> RestoreEngine {
        RestoreEngine::new(
            self.manager.clone(),
            Arc::new(ProcessLauncher),
            self.suppress.clone(),
            self.settings.daemon().browser_path,
        )
    }
}

/// Runs the tracker until ctrl-c. Events go to stdout as JSON lines;
/// commands are read from stdin the same way.
pub async fn run_daemon(app: &App) -> Result<()> {
    info!("desksession daemon starting in {}", app.data_dir.display());
    let _lock = DaemonLock::acquire(&app.data_dir, app.manager.platform().processes.as_ref())?;
    let settings = app.settings.daemon();

    match app.manager.reconcile_startup().await {
        Ok(report) => info!(
            "startup on desktop {}: {} resumed, {} auto-created, {} idled",
            report.current_desktop,
            report.resumed.len(),
            report.auto_created.len(),
            report.idled.len()
        ),
        Err(err) => warn!("startup reconciliation failed, continuing: {err:?}"),
    }

    let mut controller = DaemonController::new();
    controller.start(app.manager.clone(), &settings, app.suppress.clone())?;

    let mut events = app.events.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => error!("failed to encode event: {err}"),
                },
                Err(RecvError::Lagged(skipped)) => warn!("dropped {skipped} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let manager = app.manager.clone();
    let restore = app.restore_engine();
    let default_new_desktop = settings.restore_new_desktop;
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    let reply = handle_line(&line, &manager, &restore, default_new_desktop).await;
                    match serde_json::to_string(&reply) {
                        Ok(line) => println!("{line}"),
                        Err(err) => error!("failed to encode reply: {err}"),
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("stdin closed: {err}");
                    break;
                }
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    reader.abort();
    controller.stop().await?;
    printer.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use daemon::PID_FILE_NAME;
    use tempfile::TempDir;

    #[tokio::test]
    async fn binding_changes_are_refused_while_a_daemon_runs() {
        let dir = TempDir::new().unwrap();
        let app = App::open(dir.path().to_path_buf()).unwrap();
        app.ensure_no_daemon("restore").unwrap();

        // This test process stands in for the live daemon.
        std::fs::write(dir.path().join(PID_FILE_NAME), std::process::id().to_string()).unwrap();
        assert_eq!(app.running_daemon().unwrap(), Some(std::process::id()));
        let err = app.ensure_no_daemon("restore").unwrap_err().to_string();
        assert!(err.contains("\"command\":\"restore\""), "{err}");
    }

    #[tokio::test]
    async fn opening_creates_database_and_settings_in_the_data_dir() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested");
        let app = App::open(root.clone()).unwrap();
        assert_eq!(app.data_dir(), root.as_path());
        assert!(root.join(DATABASE_FILE_NAME).exists());
        assert!(app.manager.get_all_sessions().await.unwrap().is_empty());
    }
}
