use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::{Duration, Instant};

use crate::db::WindowInfo;
use crate::platform::{Platform, ProcessInfo, WindowHandle};

use super::filters::WindowFilter;

// Runs every snapshot tick over every top-level window; flip on when
// debugging attribution. Callers log unavailable captures themselves.
const ENABLE_LOGS: bool = false;

use crate::{log_debug, log_warn};

/// desktop id → capturable windows in enumeration order.
pub type DesktopWindows = HashMap<String, Vec<WindowInfo>>;

/// Enumerates every top-level window once and attributes each one to the
/// desktop it lives on.
#[derive(Clone)]
pub struct WindowSnapshotEngine {
    platform: Platform,
    filter: Arc<WindowFilter>,
}

impl WindowSnapshotEngine {
    pub fn new(platform: Platform, filter: WindowFilter) -> Self {
        Self {
            platform,
            filter: Arc::new(filter),
        }
    }

    /// Blocking capture across all desktops. An empty map means the window
    /// system could not be read; callers treat it as "capture unavailable".
    pub fn capture_all(&self) -> DesktopWindows {
        match self.try_capture_all() {
            Ok(mapping) => mapping,
            Err(err) => {
                log_warn!("window capture unavailable: {err:?}");
                HashMap::new()
            }
        }
    }

    /// [`capture_all`](Self::capture_all) on the blocking pool, bounded by
    /// `timeout`.
    pub async fn capture(&self, timeout: Duration) -> DesktopWindows {
        let engine = self.clone();
        let task = tokio::task::spawn_blocking(move || engine.capture_all());

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(mapping)) => mapping,
            Ok(Err(err)) => {
                log_warn!("window capture worker join failed: {err}");
                HashMap::new()
            }
            Err(_) => {
                log_warn!("window capture timeout (> {}s)", timeout.as_secs());
                HashMap::new()
            }
        }
    }

    fn try_capture_all(&self) -> Result<DesktopWindows> {
        let started = Instant::now();
        let desktop_ids: Vec<String> = self
            .platform
            .desktops
            .list_desktops()
            .context("failed to list desktops")?
            .into_iter()
            .map(|desktop| desktop.id)
            .collect();
        let handles = self
            .platform
            .windows
            .enumerate_windows()
            .context("failed to enumerate windows")?;

        let mut mapping: DesktopWindows = HashMap::new();
        let mut dropped = 0usize;

        for handle in handles {
            let Some(window) = self.describe(handle) else {
                continue;
            };
            match self.owning_desktop(handle, &desktop_ids) {
                Some(desktop_id) => mapping.entry(desktop_id).or_default().push(window),
                None => dropped += 1,
            }
        }

        let total: usize = mapping.values().map(Vec::len).sum();
        log_debug!(
            "captured {} windows across {} desktops in {}ms ({} unattributed)",
            total,
            mapping.len(),
            started.elapsed().as_millis(),
            dropped
        );
        Ok(mapping)
    }

    /// Applies the capturability filters and attaches process metadata.
    fn describe(&self, handle: WindowHandle) -> Option<WindowInfo> {
        let windows = &self.platform.windows;
        if !windows.window_exists(handle) {
            return None;
        }
        let title = windows.window_title(handle)?;
        if !WindowFilter::title_is_capturable(&title) {
            return None;
        }
        if windows.has_parent(handle) || !windows.has_caption(handle) {
            return None;
        }

        let pid = windows.window_pid(handle)?;
        let process = self
            .platform
            .processes
            .process_info(pid)
            .unwrap_or_else(|| ProcessInfo::from_exe_path(""));
        if !process.exe_name.is_empty() && self.filter.is_excluded_exe(&process.exe_name) {
            return None;
        }

        Some(WindowInfo {
            handle: handle.0,
            title,
            exe_path: process.exe_path,
            exe_name: process.exe_name,
            pid,
            working_dir: process.working_dir,
            cmd_args: process.cmd_args,
        })
    }

    /// First desktop whose membership test claims the window. Windows the OS
    /// hides from `GetWindowDesktopId`-style queries still answer this.
    fn owning_desktop(&self, handle: WindowHandle, desktop_ids: &[String]) -> Option<String> {
        for desktop_id in desktop_ids {
            match self
                .platform
                .desktops
                .is_window_on_desktop(handle, desktop_id)
            {
                Ok(true) => return Some(desktop_id.clone()),
                Ok(false) => {}
                Err(err) => {
                    log_debug!("membership test failed for {:?} on {}: {err}", handle, desktop_id);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeSystem;

    // Per-tick capture chatter stays off in shipped builds.
    const _: () = assert!(!ENABLE_LOGS);

    fn engine(system: &Arc<FakeSystem>) -> WindowSnapshotEngine {
        WindowSnapshotEngine::new(system.platform(), WindowFilter::new(["Spotify.exe"]))
    }

    #[test]
    fn windows_are_grouped_by_desktop_membership() {
        let system = FakeSystem::with_desktops(&["d1", "d2"]);
        let a = system.add_window("d1", "Code.exe", "main.rs - proj");
        let b = system.add_window("d2", "chrome.exe", "Docs");
        let c = system.add_window("d1", "WindowsTerminal.exe", "pwsh");

        let mapping = engine(&system).capture_all();
        let d1: Vec<u64> = mapping["d1"].iter().map(|w| w.handle).collect();
        assert_eq!(d1, vec![a.0, c.0]);
        assert_eq!(mapping["d2"][0].handle, b.0);
        assert_eq!(mapping["d2"][0].exe_name, "chrome.exe");
    }

    #[test]
    fn filters_drop_uncapturable_windows() {
        let system = FakeSystem::with_desktops(&["d1"]);
        let kept = system.add_window("d1", "Code.exe", "editor");
        system.add_window("d1", "explorer.exe", "File Explorer");
        system.add_window("d1", "spotify.exe", "Spotify Premium");
        system.add_window("d1", "notepad.exe", "x");
        let child = system.add_window("d1", "notepad.exe", "child dialog");
        system.set_parent(child, true);
        let bare = system.add_window("d1", "notepad.exe", "no caption");
        system.set_caption(bare, false);
        let gone = system.add_window("d1", "notepad.exe", "closing");
        system.close_window(gone);

        let mapping = engine(&system).capture_all();
        assert_eq!(mapping["d1"].len(), 1);
        assert_eq!(mapping["d1"][0].handle, kept.0);
    }

    #[test]
    fn unattributable_windows_are_dropped() {
        let system = FakeSystem::with_desktops(&["d1"]);
        system.add_window("d1", "Code.exe", "editor");
        system.add_window("ghost", "Code.exe", "pinned elsewhere");

        let mapping = engine(&system).capture_all();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping["d1"].len(), 1);
    }

    #[test]
    fn unavailable_window_system_yields_empty_mapping() {
        let system = FakeSystem::with_desktops(&["d1"]);
        system.add_window("d1", "Code.exe", "editor");
        system.set_failing(true);

        assert!(engine(&system).capture_all().is_empty());
    }

    #[tokio::test]
    async fn async_capture_matches_blocking_capture() {
        let system = FakeSystem::with_desktops(&["d1"]);
        system.add_window("d1", "Code.exe", "editor");

        let mapping = engine(&system).capture(Duration::from_secs(5)).await;
        assert_eq!(mapping["d1"].len(), 1);
    }
}
