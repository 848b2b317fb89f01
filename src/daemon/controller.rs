use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::SessionManager;
use crate::settings::DaemonSettings;
use crate::topology::{topology_loop, DesktopWatcher, SuppressHandle};

use super::timers::{snapshot_loop, time_loop};

/// Starts and stops the three periodic tasks that make up the daemon.
pub struct DaemonController {
    handles: Vec<(&'static str, JoinHandle<()>)>,
    cancel_token: Option<CancellationToken>,
}

impl DaemonController {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel_token.is_some()
    }

    /// Spawns the topology poll, snapshot capture and time accrual tasks.
    /// `suppress` must be the handle restore uses, so desktops it creates are
    /// not announced as new.
    pub fn start(
        &mut self,
        manager: SessionManager,
        settings: &DaemonSettings,
        suppress: SuppressHandle,
    ) -> Result<()> {
        if self.is_running() {
            bail!("daemon already running");
        }
        settings.validate()?;

        let cancel_token = CancellationToken::new();
        let watcher = DesktopWatcher::new(suppress);

        let topology = tokio::spawn(topology_loop(
            watcher,
            manager.platform().clone(),
            manager.clone(),
            settings.topology_poll(),
            manager.query_timeout(),
            cancel_token.clone(),
        ));
        let snapshots = tokio::spawn(snapshot_loop(
            manager.clone(),
            settings.snapshot_interval(),
            settings.capture_timeout(),
            cancel_token.clone(),
        ));
        let time = tokio::spawn(time_loop(
            manager,
            settings.time_tick(),
            cancel_token.clone(),
        ));

        self.handles = vec![
            ("topology", topology),
            ("snapshot", snapshots),
            ("time", time),
        ];
        self.cancel_token = Some(cancel_token);
        info!(
            "daemon started: poll {}ms, snapshot every {}s, time tick {}s",
            settings.topology_poll_ms, settings.snapshot_interval_secs, settings.time_tick_secs
        );
        Ok(())
    }

    /// Cancels every task and waits for each to finish its current tick.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        for (name, handle) in self.handles.drain(..) {
            handle
                .await
                .with_context(|| format!("{name} loop task failed to join"))?;
        }
        info!("daemon stopped");
        Ok(())
    }
}

impl Default for DaemonController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DaemonEvent;
    use crate::test_support::Harness;
    use tokio::time::{timeout, Duration};

    fn fast_settings() -> DaemonSettings {
        DaemonSettings {
            topology_poll_ms: 20,
            ..DaemonSettings::default()
        }
    }

    #[tokio::test]
    async fn running_daemon_announces_new_desktops() {
        let harness = Harness::new(&["d1"]);
        let mut events = harness.manager.events().subscribe();
        let mut controller = DaemonController::new();
        controller
            .start(harness.manager.clone(), &fast_settings(), SuppressHandle::new())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        harness.system.add_desktop("d2");

        let event = timeout(Duration::from_secs(2), async {
            loop {
                match events.recv().await {
                    Ok(DaemonEvent::NewDesktopDetected { desktop_id }) => break desktop_id,
                    Ok(_) => continue,
                    Err(err) => panic!("event bus closed: {err}"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(event, "d2");

        controller.stop().await.unwrap();
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn suppressed_desktop_is_not_announced() {
        let mut harness = Harness::new(&["d1"]);
        let suppress = SuppressHandle::new();
        let mut controller = DaemonController::new();
        controller
            .start(harness.manager.clone(), &fast_settings(), suppress.clone())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        suppress.suppress_next_new_desktop();
        harness.system.add_desktop("d2");
        tokio::time::sleep(Duration::from_millis(200)).await;
        controller.stop().await.unwrap();

        assert!(!harness
            .drain_events()
            .iter()
            .any(|event| matches!(event, DaemonEvent::NewDesktopDetected { .. })));
        assert_eq!(suppress.pending(), 0);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let harness = Harness::new(&["d1"]);
        let mut controller = DaemonController::new();
        controller
            .start(harness.manager.clone(), &fast_settings(), SuppressHandle::new())
            .unwrap();
        assert!(controller
            .start(harness.manager.clone(), &fast_settings(), SuppressHandle::new())
            .is_err());
        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let mut controller = DaemonController::new();
        controller.stop().await.unwrap();
    }
}
