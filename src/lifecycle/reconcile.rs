use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{info, warn};

use crate::db::{SaveOutcome, Session, SessionStatus};
use crate::events::DaemonEvent;
use crate::platform::VirtualDesktop;

use super::manager::SessionManager;

/// What startup reconciliation did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub current_desktop: String,
    /// Stored sessions rebound to a live desktop.
    pub resumed: Vec<String>,
    /// "Desktop N" sessions created for untracked desktops with windows.
    pub auto_created: Vec<Session>,
    /// Sessions whose desktop is gone.
    pub idled: Vec<String>,
}

impl SessionManager {
    /// Aligns stored sessions with the desktops that exist right now. Runs
    /// once, before the periodic tasks start.
    pub async fn reconcile_startup(&self) -> Result<ReconcileReport> {
        let inner = &self.inner;
        let desktops_api = inner.platform.desktops.clone();
        let task = tokio::task::spawn_blocking(
            move || -> Result<(Vec<VirtualDesktop>, String)> {
                Ok((desktops_api.list_desktops()?, desktops_api.current_desktop()?))
            },
        );
        let (desktops, current) = tokio::time::timeout(inner.query_timeout, task)
            .await
            .map_err(|_| anyhow!("desktop listing timed out during reconciliation"))?
            .context("desktop listing worker join failed")??;

        let capture = inner.engine.capture(inner.query_timeout).await;
        let tabs = self.list_tabs().await;
        let sessions = inner.db.get_all_sessions().await?;

        let mut report = ReconcileReport {
            current_desktop: current.clone(),
            ..ReconcileReport::default()
        };
        let mut bound_ids: HashSet<String> = HashSet::new();
        let mut current_session: Option<String> = None;
        let mut state = inner.state.lock().await;

        for desktop in &desktops {
            let is_current = desktop.id == current;
            let status = if is_current {
                SessionStatus::Active
            } else {
                SessionStatus::Paused
            };

            // Prefer the live claimant; an idle session whose desktop id came
            // back (same boot, restarted daemon) is revived.
            let stored = sessions
                .iter()
                .filter(|session| session.desktop_id.as_deref() == Some(desktop.id.as_str()))
                .max_by_key(|session| (session.status != SessionStatus::Idle, session.updated_at));

            let session_id = match stored {
                Some(session) => {
                    inner.db.update_status(&session.id, status).await?;
                    report.resumed.push(session.id.clone());
                    session.id.clone()
                }
                None => {
                    let has_windows = capture
                        .get(&desktop.id)
                        .is_some_and(|windows| !windows.is_empty());
                    if !has_windows {
                        continue;
                    }
                    let mut session = Session::new(
                        &format!("Desktop {}", desktop.ordinal),
                        Some(&desktop.id),
                        Utc::now(),
                    );
                    session.status = status;
                    let created = inner.db.create_session(&session).await?;
                    info!("auto-created '{}' for desktop {}", created.name, desktop.id);
                    report.auto_created.push(created.clone());
                    created.id
                }
            };

            state.bind(&desktop.id, &session_id);
            bound_ids.insert(session_id.clone());
            if is_current {
                current_session = Some(session_id.clone());
            }
            self.publish_status(&session_id, status);

            if capture.is_empty() {
                continue;
            }
            let windows = capture.get(&desktop.id).cloned().unwrap_or_default();
            let session_tabs = if is_current { tabs.clone() } else { Vec::new() };
            match inner.db.save_snapshot(&session_id, windows, session_tabs).await {
                Ok(SaveOutcome::Written { .. }) => {
                    inner.events.publish(DaemonEvent::SnapshotSaved {
                        session_id: session_id.clone(),
                    });
                }
                Ok(SaveOutcome::Retained) => {}
                Err(err) => warn!("startup capture failed for {session_id}: {err:?}"),
            }
        }

        for session in &sessions {
            if session.status == SessionStatus::Idle || bound_ids.contains(&session.id) {
                continue;
            }
            inner
                .db
                .update_status(&session.id, SessionStatus::Idle)
                .await?;
            report.idled.push(session.id.clone());
            self.publish_status(&session.id, SessionStatus::Idle);
        }

        match &current_session {
            Some(session_id) => {
                state.mark_active(session_id);
            }
            None => {
                if let Some(active) = state.active_session().map(str::to_string) {
                    state.clear_active_if(&active);
                }
            }
        }

        info!(
            "reconciled {} desktops: {} resumed, {} auto-created, {} idled",
            desktops.len(),
            report.resumed.len(),
            report.auto_created.len(),
            report.idled.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;

    #[tokio::test]
    async fn bound_desktops_resume_with_focus_driven_status() {
        let harness = Harness::new(&["d1", "d2"]);
        let focused = harness.seed_session("Focused", "d1").await;
        let background = harness.seed_session("Background", "d2").await;

        let report = harness.manager.reconcile_startup().await.unwrap();
        assert_eq!(report.resumed.len(), 2);
        assert!(report.auto_created.is_empty());

        let focused = harness.db.get_session(&focused.id).await.unwrap().unwrap();
        let background = harness.db.get_session(&background.id).await.unwrap().unwrap();
        assert_eq!(focused.status, SessionStatus::Active);
        assert_eq!(background.status, SessionStatus::Paused);
        assert_eq!(
            harness.manager.get_active_session_id().await.unwrap(),
            Some(focused.id.clone())
        );
    }

    #[tokio::test]
    async fn unbound_desktop_with_windows_gets_auto_session() {
        let harness = Harness::new(&["d1", "d2", "d3"]);
        harness.system.add_window("d2", "Code.exe", "main.rs");
        harness.system.add_window("d2", "chrome.exe", "docs");

        let report = harness.manager.reconcile_startup().await.unwrap();
        assert_eq!(report.auto_created.len(), 1);

        let auto = &report.auto_created[0];
        assert_eq!(auto.name, "Desktop 2");
        assert_eq!(auto.status, SessionStatus::Paused);
        let windows = harness.db.get_windows(&auto.id).await.unwrap();
        assert_eq!(windows.len(), 2);
    }

    #[tokio::test]
    async fn sessions_on_vanished_desktops_go_idle() {
        let harness = Harness::new(&["d1"]);
        let stale = harness.seed_session("Yesterday", "gone").await;

        let report = harness.manager.reconcile_startup().await.unwrap();
        assert_eq!(report.idled, vec![stale.id.clone()]);
        let stale = harness.db.get_session(&stale.id).await.unwrap().unwrap();
        assert_eq!(stale.status, SessionStatus::Idle);
        assert_eq!(harness.manager.get_active_session_id().await.unwrap(), None);
    }

    #[tokio::test]
    async fn idle_session_is_revived_when_its_desktop_reappears() {
        let harness = Harness::new(&["d1", "d2"]);
        let session = harness.seed_session("Back again", "d2").await;
        harness
            .db
            .update_status(&session.id, SessionStatus::Idle)
            .await
            .unwrap();

        let report = harness.manager.reconcile_startup().await.unwrap();
        assert_eq!(report.resumed, vec![session.id.clone()]);
        let session = harness.db.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Paused);
    }

    #[tokio::test]
    async fn reconciliation_fails_cleanly_without_desktop_api() {
        let harness = Harness::new(&["d1"]);
        harness.system.set_failing(true);
        assert!(harness.manager.reconcile_startup().await.is_err());
    }
}
