use anyhow::{anyhow, Context, Result};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::lifecycle::SessionManager;
use crate::platform::Platform;

use super::watcher::DesktopWatcher;

// On: events are rare. Failed polls repeat twice a second while the desktop
// API is down; flip off to silence them.
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Live desktop ids in ordinal order plus the active id.
pub async fn poll_topology(
    platform: &Platform,
    timeout: Duration,
) -> Result<(Vec<String>, String)> {
    let desktops = platform.desktops.clone();
    let task = tokio::task::spawn_blocking(move || -> Result<(Vec<String>, String)> {
        let ids = desktops
            .list_desktops()?
            .into_iter()
            .map(|desktop| desktop.id)
            .collect();
        let active = desktops.current_desktop()?;
        Ok((ids, active))
    });

    tokio::time::timeout(timeout, task)
        .await
        .map_err(|_| anyhow!("desktop poll timed out after {}ms", timeout.as_millis()))?
        .context("desktop poll worker join failed")?
}

pub async fn topology_loop(
    mut watcher: DesktopWatcher,
    platform: Platform,
    manager: SessionManager,
    poll_interval: Duration,
    query_timeout: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_tick(&mut watcher, &platform, &manager, query_timeout).await;
            }
            _ = cancel_token.cancelled() => {
                log_info!("topology loop shutting down");
                break;
            }
        }
    }
}

async fn run_tick(
    watcher: &mut DesktopWatcher,
    platform: &Platform,
    manager: &SessionManager,
    query_timeout: Duration,
) {
    let (ids, active) = match poll_topology(platform, query_timeout).await {
        Ok(state) => state,
        Err(err) => {
            log_warn!("desktop poll failed, keeping previous baseline: {err:?}");
            return;
        }
    };

    for event in watcher.observe(ids, active) {
        log_info!("topology event: {:?}", event);
        if let Err(err) = manager.handle_topology_event(event).await {
            log_error!("failed to handle topology event: {err:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SessionStatus;
    use crate::events::DaemonEvent;
    use crate::test_support::Harness;
    use crate::topology::SuppressHandle;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn failed_poll_keeps_baseline_and_recovers() {
        let mut harness = Harness::new(&["d1"]);
        let mut watcher = DesktopWatcher::new(SuppressHandle::new());
        let platform = harness.system.platform();

        run_tick(&mut watcher, &platform, &harness.manager, TIMEOUT).await;
        assert!(watcher.is_primed());

        harness.system.set_failing(true);
        harness.system.add_desktop("d2");
        run_tick(&mut watcher, &platform, &harness.manager, TIMEOUT).await;
        assert!(harness.drain_events().is_empty());

        harness.system.set_failing(false);
        run_tick(&mut watcher, &platform, &harness.manager, TIMEOUT).await;
        assert_eq!(
            harness.drain_events(),
            vec![DaemonEvent::NewDesktopDetected {
                desktop_id: "d2".into()
            }]
        );
    }

    #[tokio::test]
    async fn switch_pauses_and_resumes_bound_sessions() {
        let harness = Harness::new(&["d1", "d2"]);
        let first = harness.manager.create_session("First", "d1").await.unwrap();
        let second = harness.manager.create_session("Second", "d2").await.unwrap();

        // Baseline says d2 is focused; the OS now reports d1.
        let mut watcher = DesktopWatcher::new(SuppressHandle::new());
        let platform = harness.system.platform();
        watcher.observe(vec!["d1".into(), "d2".into()], "d2".into());
        run_tick(&mut watcher, &platform, &harness.manager, TIMEOUT).await;

        let first = harness.db.get_session(&first.id).await.unwrap().unwrap();
        let second = harness.db.get_session(&second.id).await.unwrap().unwrap();
        assert_eq!(first.status, SessionStatus::Active);
        assert_eq!(second.status, SessionStatus::Paused);
        assert_eq!(
            harness.manager.get_active_session_id().await.unwrap(),
            Some(first.id.clone())
        );
    }

    #[tokio::test]
    async fn focusing_a_new_desktop_pauses_the_session_left_behind() {
        let mut harness = Harness::new(&["d1"]);
        let work = harness.manager.create_session("Work", "d1").await.unwrap();
        let mut watcher = DesktopWatcher::new(SuppressHandle::new());
        let platform = harness.system.platform();
        run_tick(&mut watcher, &platform, &harness.manager, TIMEOUT).await;
        harness.drain_events();

        harness.system.add_desktop("d2");
        harness.system.set_current("d2");
        run_tick(&mut watcher, &platform, &harness.manager, TIMEOUT).await;
        assert!(harness.manager.cancel_pending_prompt("d2").await);

        for _ in 0..3 {
            harness.manager.tick_time(60).await.unwrap();
        }

        let work = harness.db.get_session(&work.id).await.unwrap().unwrap();
        assert_eq!(work.status, SessionStatus::Paused);
        assert_eq!(work.total_seconds, 0);
        assert_eq!(harness.manager.get_active_session_id().await.unwrap(), None);
        assert!(harness.drain_events().contains(&DaemonEvent::SessionStatusChanged {
            session_id: work.id.clone(),
            status: SessionStatus::Paused,
        }));
    }
}
