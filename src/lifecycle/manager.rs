use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::capture::{collect_tabs, filter_tabs, TabSource, WindowFilter, WindowSnapshotEngine};
use crate::db::{
    Database, SaveOutcome, Session, SessionStats, SessionStatus, TabInfo, WindowInfo,
};
use crate::events::{DaemonEvent, EventBus};
use crate::platform::Platform;
use crate::settings::DaemonSettings;
use crate::topology::TopologyEvent;

use super::salvage::salvage_windows;
use super::state::TrackerState;

/// Minimum gap between two manual "new session" requests.
pub const PROMPT_DEBOUNCE: Duration = Duration::from_millis(500);

pub(super) struct ManagerInner {
    pub(super) db: Database,
    pub(super) platform: Platform,
    pub(super) engine: WindowSnapshotEngine,
    pub(super) tabs: Arc<dyn TabSource>,
    pub(super) events: EventBus,
    pub(super) state: Mutex<TrackerState>,
    pub(super) query_timeout: Duration,
}

/// Owns the desktop ↔ session binding and drives session status from
/// topology changes. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    pub(super) inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn new(
        db: Database,
        platform: Platform,
        tabs: Arc<dyn TabSource>,
        events: EventBus,
        settings: &DaemonSettings,
    ) -> Self {
        let engine = WindowSnapshotEngine::new(
            platform.clone(),
            WindowFilter::new(settings.excluded_exes.iter()),
        );
        Self {
            inner: Arc::new(ManagerInner {
                db,
                platform,
                engine,
                tabs,
                events,
                state: Mutex::new(TrackerState::new()),
                query_timeout: settings.capture_timeout(),
            }),
        }
    }

    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    pub fn platform(&self) -> &Platform {
        &self.inner.platform
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn query_timeout(&self) -> Duration {
        self.inner.query_timeout
    }

    /// Names the desktop `desktop_id` as a new session. Repeated calls for a
    /// desktop that already has a live session return that session.
    pub async fn create_session(&self, name: &str, desktop_id: &str) -> Result<Session> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Session name cannot be empty");
        }

        let session = {
            let mut state = self.inner.state.lock().await;
            if let Some(existing_id) = state.session_for(desktop_id).map(str::to_string) {
                if let Some(existing) = self.inner.db.get_session(&existing_id).await? {
                    if existing.status != SessionStatus::Idle {
                        state.clear_prompt(desktop_id);
                        debug!("desktop {desktop_id} already tracked by {}", existing.id);
                        return Ok(existing);
                    }
                }
            }

            let created = self
                .inner
                .db
                .create_session(&Session::new(name, Some(desktop_id), Utc::now()))
                .await
                .context("failed to create session")?;

            state.bind(desktop_id, &created.id);
            if created.status == SessionStatus::Active {
                self.note_activation(&mut state, &created.id);
            }
            created
        };

        info!("session '{}' tracking desktop {}", session.name, desktop_id);
        self.publish_status(&session.id, session.status);

        if let Err(err) = self.capture_session(&session.id, desktop_id).await {
            warn!("initial capture for session {} failed: {err:?}", session.id);
        }
        Ok(session)
    }

    /// The naming prompt for `desktop_id` was dismissed.
    pub async fn cancel_pending_prompt(&self, desktop_id: &str) -> bool {
        let cleared = self.inner.state.lock().await.clear_prompt(desktop_id);
        if cleared {
            info!("naming prompt for desktop {desktop_id} cancelled");
        }
        cleared
    }

    /// Raises `NewDesktopDetected` unless the desktop is already tracked or
    /// a prompt for it is still open.
    pub async fn handle_new_desktop(&self, desktop_id: &str) -> bool {
        {
            let mut state = self.inner.state.lock().await;
            if state.is_tracked(desktop_id) {
                debug!("desktop {desktop_id} already has a session");
                return false;
            }
            if !state.begin_prompt(desktop_id) {
                debug!("prompt already open for desktop {desktop_id}");
                return false;
            }
        }

        info!("new desktop {desktop_id} detected");
        self.inner.events.publish(DaemonEvent::NewDesktopDetected {
            desktop_id: desktop_id.to_string(),
        });
        true
    }

    /// Manual request to name the focused desktop.
    pub async fn trigger_new_session_prompt(&self) -> Result<bool> {
        {
            let mut state = self.inner.state.lock().await;
            if !state.allow_prompt_request(Instant::now(), PROMPT_DEBOUNCE) {
                debug!("new session request debounced");
                return Ok(false);
            }
        }

        let desktop_id = self.current_desktop().await?;
        Ok(self.handle_new_desktop(&desktop_id).await)
    }

    pub async fn handle_topology_event(&self, event: TopologyEvent) -> Result<()> {
        match event {
            TopologyEvent::Created { desktop_id } => {
                self.handle_new_desktop(&desktop_id).await;
                Ok(())
            }
            TopologyEvent::Removed {
                desktop_id,
                now_active,
            } => self.handle_removed(&desktop_id, &now_active).await,
            TopologyEvent::Switched { from, to } => self.handle_switch(&from, &to).await,
        }
    }

    async fn handle_switch(&self, from: &str, to: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;

        if let Some(from_session) = state.session_for(from).map(str::to_string) {
            if state.active_session() == Some(from_session.as_str()) {
                self.inner
                    .db
                    .update_status(&from_session, SessionStatus::Paused)
                    .await?;
                state.clear_active_if(&from_session);
                self.publish_status(&from_session, SessionStatus::Paused);
            }
        }

        if let Some(to_session) = state.session_for(to).map(str::to_string) {
            self.inner
                .db
                .update_status(&to_session, SessionStatus::Active)
                .await?;
            self.note_activation(&mut state, &to_session);
            self.publish_status(&to_session, SessionStatus::Active);
        }

        Ok(())
    }

    /// Salvages what the session can still claim, then idles it.
    async fn handle_removed(&self, desktop_id: &str, now_active: &str) -> Result<()> {
        let bound = self
            .inner
            .state
            .lock()
            .await
            .session_for(desktop_id)
            .map(str::to_string);
        let session_id = match bound {
            Some(session_id) => session_id,
            None => match self.inner.db.get_session_by_desktop(desktop_id).await? {
                Some(session) if session.status != SessionStatus::Idle => session.id,
                _ => {
                    self.inner.state.lock().await.clear_prompt(desktop_id);
                    return Ok(());
                }
            },
        };

        let mut capture = self.inner.engine.capture(self.inner.query_timeout).await;
        let known: Vec<String> = self
            .inner
            .db
            .get_windows(&session_id)
            .await?
            .into_iter()
            .map(|window| window.exe_name)
            .collect();
        let neighbour = capture.remove(now_active).unwrap_or_default();

        match salvage_windows(&known, &neighbour) {
            Some(windows) => {
                info!(
                    "salvaged {} windows for session {} from desktop {}",
                    windows.len(),
                    session_id,
                    now_active
                );
                if let Err(err) = self.store_capture(&session_id, windows, Vec::new()).await {
                    warn!("failed to store salvaged windows for {session_id}: {err:?}");
                }
            }
            None => debug!("nothing to salvage for session {session_id}"),
        }

        self.inner
            .db
            .update_status(&session_id, SessionStatus::Idle)
            .await?;
        {
            let mut state = self.inner.state.lock().await;
            state.unbind_desktop(desktop_id);
            state.clear_prompt(desktop_id);
        }
        info!("desktop {desktop_id} removed, session {session_id} is now idle");
        self.publish_status(&session_id, SessionStatus::Idle);
        Ok(())
    }

    /// One global capture stored for every bound session. Tabs go to the
    /// active session only.
    pub async fn capture_all_sessions(&self) -> Result<usize> {
        let (bindings, active) = {
            let state = self.inner.state.lock().await;
            (state.bindings(), state.active_session().map(str::to_string))
        };
        if bindings.is_empty() {
            return Ok(0);
        }

        let mut capture = self.inner.engine.capture(self.inner.query_timeout).await;
        if capture.is_empty() {
            warn!("window capture unavailable, skipping snapshot tick");
            return Ok(0);
        }
        let tabs = self.list_tabs().await;

        let mut written = 0;
        for (desktop_id, session_id) in bindings {
            let windows = capture.remove(&desktop_id).unwrap_or_default();
            let session_tabs = if active.as_deref() == Some(session_id.as_str()) {
                tabs.clone()
            } else {
                Vec::new()
            };

            match self.store_capture(&session_id, windows, session_tabs).await {
                Ok(SaveOutcome::Written { .. }) => written += 1,
                Ok(SaveOutcome::Retained) => {
                    debug!("empty capture for {session_id}, kept stored windows")
                }
                Err(err) => error!("snapshot failed for session {session_id}: {err:?}"),
            }
        }
        Ok(written)
    }

    /// Captures the focused desktop now.
    pub async fn trigger_manual_snapshot(&self) -> Result<SaveOutcome> {
        let desktop_id = self.current_desktop().await?;
        let session_id = self
            .inner
            .state
            .lock()
            .await
            .session_for(&desktop_id)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("No session is tracking the current desktop"))?;

        let mut capture = self.inner.engine.capture(self.inner.query_timeout).await;
        if capture.is_empty() {
            bail!("Window capture is unavailable");
        }
        let windows = capture.remove(&desktop_id).unwrap_or_default();
        let tabs = self.list_tabs().await;
        self.store_capture(&session_id, windows, tabs).await
    }

    /// Tabs pushed by an external tab host for `session_id`.
    pub async fn receive_tabs(&self, session_id: &str, tabs: Vec<TabInfo>) -> Result<Vec<TabInfo>> {
        let tabs = filter_tabs(tabs);
        let stored = self.inner.db.save_tabs(session_id, tabs.clone()).await?;
        if !stored {
            debug!("ignored empty tab push for {session_id}");
        }
        self.inner.events.publish(DaemonEvent::TabsReceived {
            session_id: session_id.to_string(),
            tabs: tabs.clone(),
        });
        Ok(tabs)
    }

    /// Credits `seconds` to the active session. Returns how many sessions
    /// accrued time.
    pub async fn tick_time(&self, seconds: u64) -> Result<usize> {
        let bindings = self.inner.state.lock().await.bindings();
        let mut accrued = 0;
        for (_, session_id) in bindings {
            if self.inner.db.add_session_time(&session_id, seconds).await? {
                accrued += 1;
            }
        }
        Ok(accrued)
    }

    pub async fn get_all_sessions(&self) -> Result<Vec<Session>> {
        self.inner.db.get_all_sessions().await
    }

    pub async fn get_session_stats(&self, session_id: &str) -> Result<SessionStats> {
        self.inner.db.get_session_stats(session_id).await
    }

    /// The session bound to the focused desktop, if any.
    pub async fn get_active_session_id(&self) -> Result<Option<String>> {
        let desktop_id = self.current_desktop().await?;
        Ok(self
            .inner
            .state
            .lock()
            .await
            .session_for(&desktop_id)
            .map(str::to_string))
    }

    /// Moves a session onto `desktop_id` and activates it.
    pub async fn rebind_session(&self, session_id: &str, desktop_id: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        self.inner
            .db
            .bind_session_to_desktop(session_id, desktop_id)
            .await?;

        if let Some(previous) = state.bind(desktop_id, session_id) {
            state.clear_active_if(&previous);
            self.publish_status(&previous, SessionStatus::Idle);
        }
        self.note_activation(&mut state, session_id);
        self.publish_status(session_id, SessionStatus::Active);
        Ok(())
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let mut state = self.inner.state.lock().await;
        let deleted = self.inner.db.delete_session(session_id).await?;
        if deleted {
            state.unbind_session(session_id);
        }
        Ok(deleted)
    }

    pub async fn current_desktop(&self) -> Result<String> {
        let desktops = self.inner.platform.desktops.clone();
        let task = tokio::task::spawn_blocking(move || desktops.current_desktop());
        tokio::time::timeout(self.inner.query_timeout, task)
            .await
            .map_err(|_| anyhow!("current desktop query timed out"))?
            .context("desktop query worker join failed")?
    }

    /// Captures one desktop for one session. Skipped when capture is
    /// unavailable.
    pub(super) async fn capture_session(
        &self,
        session_id: &str,
        desktop_id: &str,
    ) -> Result<Option<SaveOutcome>> {
        let mut capture = self.inner.engine.capture(self.inner.query_timeout).await;
        if capture.is_empty() {
            return Ok(None);
        }
        let windows = capture.remove(desktop_id).unwrap_or_default();
        let is_active =
            self.inner.state.lock().await.active_session() == Some(session_id);
        let tabs = if is_active {
            self.list_tabs().await
        } else {
            Vec::new()
        };
        self.store_capture(session_id, windows, tabs).await.map(Some)
    }

    pub(super) async fn store_capture(
        &self,
        session_id: &str,
        windows: Vec<WindowInfo>,
        tabs: Vec<TabInfo>,
    ) -> Result<SaveOutcome> {
        let outcome = self.inner.db.save_snapshot(session_id, windows, tabs).await?;
        if let SaveOutcome::Written {
            window_count,
            tab_count,
            ..
        } = &outcome
        {
            debug!("snapshot for {session_id}: {window_count} windows, {tab_count} tabs");
            self.inner.events.publish(DaemonEvent::SnapshotSaved {
                session_id: session_id.to_string(),
            });
        }
        Ok(outcome)
    }

    pub(super) async fn list_tabs(&self) -> Vec<TabInfo> {
        let source = self.inner.tabs.clone();
        let task = tokio::task::spawn_blocking(move || collect_tabs(source.as_ref()));
        match tokio::time::timeout(self.inner.query_timeout, task).await {
            Ok(Ok(tabs)) => tabs,
            Ok(Err(err)) => {
                warn!("tab listing worker join failed: {err}");
                Vec::new()
            }
            Err(_) => {
                warn!("tab listing timed out");
                Vec::new()
            }
        }
    }

    /// Mirrors an activation that already committed, announcing the session
    /// the store paused alongside it.
    pub(super) fn note_activation(&self, state: &mut TrackerState, session_id: &str) {
        if let Some(displaced) = state.mark_active(session_id) {
            self.publish_status(&displaced, SessionStatus::Paused);
        }
    }

    pub(super) fn publish_status(&self, session_id: &str, status: SessionStatus) {
        self.inner.events.publish(DaemonEvent::SessionStatusChanged {
            session_id: session_id.to_string(),
            status,
        });
    }
}
