use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use serde::Serialize;
use tokio::time::Duration;

use crate::db::{TabInfo, WindowInfo};
use crate::lifecycle::SessionManager;
use crate::topology::SuppressHandle;

use super::launcher::{LaunchCommand, Launcher};
use super::plan::{build_plan, restore_preview, RestorePlan};

/// Waits that give the shell time to settle between restore steps.
#[derive(Debug, Clone, Copy)]
pub struct RestorePacing {
    pub after_create: Duration,
    pub after_switch: Duration,
    /// Before additional tabs, so they join the window the first URL opened.
    pub browser_warmup: Duration,
    pub between_launches: Duration,
}

impl Default for RestorePacing {
    fn default() -> Self {
        Self {
            after_create: Duration::from_millis(600),
            after_switch: Duration::from_millis(400),
            browser_warmup: Duration::from_millis(1500),
            between_launches: Duration::from_millis(200),
        }
    }
}

impl RestorePacing {
    pub fn immediate() -> Self {
        Self {
            after_create: Duration::ZERO,
            after_switch: Duration::ZERO,
            browser_warmup: Duration::ZERO,
            between_launches: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    /// Desktop created for the restore, if one was.
    pub new_desktop: Option<String>,
    pub tabs: usize,
    pub editors: usize,
    pub terminals: usize,
    pub other: usize,
    pub failed: usize,
    pub total: usize,
}

pub struct RestoreEngine {
    manager: SessionManager,
    launcher: Arc<dyn Launcher>,
    suppress: SuppressHandle,
    preferred_browser: Option<String>,
    pacing: RestorePacing,
}

impl RestoreEngine {
    pub fn new(
        manager: SessionManager,
        launcher: Arc<dyn Launcher>,
        suppress: SuppressHandle,
        preferred_browser: Option<String>,
    ) -> Self {
        Self {
            manager,
            launcher,
            suppress,
            preferred_browser,
            pacing: RestorePacing::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: RestorePacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// What `restore_session` would reopen, as display lines.
    pub async fn preview(&self, session_id: &str) -> Result<Vec<String>> {
        let (windows, tabs) = self.load_snapshot(session_id).await?;
        Ok(restore_preview(&windows, &tabs))
    }

    pub async fn plan(&self, session_id: &str) -> Result<RestorePlan> {
        let (windows, tabs) = self.load_snapshot(session_id).await?;
        Ok(build_plan(
            &windows,
            &tabs,
            self.preferred_browser.as_deref(),
            self.launcher.as_ref(),
        ))
    }

    /// Relaunches the latest snapshot of `session_id`, optionally on a fresh
    /// desktop, then binds the session to wherever it landed. Individual
    /// launch failures are counted, never fatal.
    pub async fn restore_session(
        &self,
        session_id: &str,
        new_desktop: bool,
    ) -> Result<RestoreSummary> {
        let plan = self.plan(session_id).await?;

        let created = if new_desktop {
            match self.create_and_switch().await {
                Ok(desktop_id) => Some(desktop_id),
                Err(err) => {
                    warn!("restoring onto the current desktop: {err:?}");
                    None
                }
            }
        } else {
            None
        };

        let mut summary = RestoreSummary {
            new_desktop: created.clone(),
            ..RestoreSummary::default()
        };
        self.launch_plan(&plan, &mut summary).await;
        summary.total = summary.tabs + summary.editors + summary.terminals + summary.other;

        let target = match created {
            Some(desktop_id) => desktop_id,
            None => self.manager.current_desktop().await?,
        };
        self.manager
            .rebind_session(session_id, &target)
            .await
            .context("failed to rebind restored session")?;

        info!(
            "restored session {session_id} onto {target}: {} launched, {} failed",
            summary.total, summary.failed
        );
        Ok(summary)
    }

    async fn load_snapshot(&self, session_id: &str) -> Result<(Vec<WindowInfo>, Vec<TabInfo>)> {
        let db = self.manager.db();
        if db.get_session(session_id).await?.is_none() {
            return Err(anyhow!("Session not found"));
        }
        let windows = db
            .get_windows(session_id)
            .await?
            .into_iter()
            .map(WindowInfo::from)
            .collect();
        let tabs = db
            .get_tabs(session_id)
            .await?
            .into_iter()
            .map(TabInfo::from)
            .collect();
        Ok((windows, tabs))
    }

    /// Creates a desktop without prompting for it and moves focus there.
    async fn create_and_switch(&self) -> Result<String> {
        let desktops = self.manager.platform().desktops.clone();
        let timeout = self.manager.query_timeout();

        self.suppress.suppress_next_new_desktop();
        let create = {
            let desktops = desktops.clone();
            tokio::task::spawn_blocking(move || desktops.create_desktop())
        };
        let desktop_id = match tokio::time::timeout(timeout, create).await {
            Ok(Ok(Ok(desktop_id))) => desktop_id,
            Ok(Ok(Err(err))) => {
                self.suppress.release();
                return Err(err.context("failed to create desktop"));
            }
            Ok(Err(join_err)) => {
                self.suppress.release();
                return Err(anyhow!("desktop creation worker join failed: {join_err}"));
            }
            Err(_) => {
                self.suppress.release();
                return Err(anyhow!("desktop creation timed out"));
            }
        };
        tokio::time::sleep(self.pacing.after_create).await;

        let target = desktop_id.clone();
        let switch = tokio::task::spawn_blocking(move || desktops.switch_to_desktop(&target));
        match tokio::time::timeout(timeout, switch).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => warn!("could not switch to desktop {desktop_id}: {err:?}"),
            Ok(Err(join_err)) => warn!("desktop switch worker join failed: {join_err}"),
            Err(_) => warn!("switch to desktop {desktop_id} timed out"),
        }
        tokio::time::sleep(self.pacing.after_switch).await;
        Ok(desktop_id)
    }

    async fn launch_plan(&self, plan: &RestorePlan, summary: &mut RestoreSummary) {
        summary.tabs = self.open_urls(plan, &mut summary.failed).await;
        summary.editors = self.launch_all(&plan.editors, &mut summary.failed).await;
        summary.terminals = self.launch_all(&plan.terminals, &mut summary.failed).await;
        summary.other = self.launch_all(&plan.other, &mut summary.failed).await;
    }

    async fn open_urls(&self, plan: &RestorePlan, failed: &mut usize) -> usize {
        let mut opened = 0;
        for (index, url) in plan.urls.iter().enumerate() {
            let result = match plan.browser.as_deref() {
                Some(browser) if index == 0 => self
                    .launcher
                    .launch(&LaunchCommand::new(browser).arg("--new-window").arg(url.as_str())),
                Some(browser) => self
                    .launcher
                    .launch(&LaunchCommand::new(browser).arg(url.as_str())),
                None => self.launcher.open_default(url),
            };

            match result {
                Ok(()) => opened += 1,
                Err(err) => {
                    warn!("failed to open {url}: {err:?}");
                    *failed += 1;
                }
            }

            let pause = if index == 0 {
                self.pacing.browser_warmup
            } else {
                self.pacing.between_launches
            };
            tokio::time::sleep(pause).await;
        }
        opened
    }

    async fn launch_all(&self, commands: &[LaunchCommand], failed: &mut usize) -> usize {
        let mut launched = 0;
        for command in commands {
            match self.launcher.launch(command) {
                Ok(()) => launched += 1,
                Err(err) => {
                    warn!("failed to launch {}: {err:?}", command.program);
                    *failed += 1;
                }
            }
            tokio::time::sleep(self.pacing.between_launches).await;
        }
        launched
    }
}
