//! In-memory stand-ins for the OS, the tab host and the launcher.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::broadcast;

use crate::capture::TabSource;
use crate::db::{Database, Session, TabInfo, WindowInfo};
use crate::events::{DaemonEvent, EventBus};
use crate::lifecycle::SessionManager;
use crate::platform::{
    DesktopManager, Platform, ProcessInfo, ProcessLookup, VirtualDesktop, WindowHandle,
    WindowSystem,
};
use crate::restore::{LaunchCommand, Launcher};
use crate::settings::DaemonSettings;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct FakeWindow {
    handle: WindowHandle,
    desktop: String,
    title: String,
    pid: u32,
    parent: bool,
    caption: bool,
    exists: bool,
}

#[derive(Default)]
struct FakeState {
    desktops: Vec<String>,
    current: Option<String>,
    windows: Vec<FakeWindow>,
    processes: HashMap<u32, ProcessInfo>,
    failing: bool,
    create_fails: bool,
    next_handle: u64,
    created: Vec<String>,
    switches: Vec<String>,
}

/// Desktops, windows and processes in one scriptable fake.
#[derive(Default)]
pub struct FakeSystem {
    state: Mutex<FakeState>,
}

impl FakeSystem {
    /// Desktops in ordinal order; the first one is current.
    pub fn with_desktops(ids: &[&str]) -> Arc<Self> {
        let system = Self::default();
        {
            let mut state = lock(&system.state);
            state.desktops = ids.iter().map(|id| id.to_string()).collect();
            state.current = state.desktops.first().cloned();
            state.next_handle = 100;
        }
        Arc::new(system)
    }

    pub fn platform(self: &Arc<Self>) -> Platform {
        Platform {
            desktops: self.clone(),
            windows: self.clone(),
            processes: self.clone(),
        }
    }

    pub fn add_desktop(&self, id: &str) {
        lock(&self.state).desktops.push(id.to_string());
    }

    pub fn remove_desktop(&self, id: &str) {
        let mut state = lock(&self.state);
        state.desktops.retain(|desktop| desktop != id);
        if state.current.as_deref() == Some(id) {
            state.current = state.desktops.first().cloned();
        }
    }

    pub fn set_current(&self, id: &str) {
        lock(&self.state).current = Some(id.to_string());
    }

    pub fn current(&self) -> Option<String> {
        lock(&self.state).current.clone()
    }

    pub fn add_window(&self, desktop: &str, exe_name: &str, title: &str) -> WindowHandle {
        let info = ProcessInfo::from_exe_path(&format!("C:\\Apps\\{exe_name}"));
        self.add_window_with(desktop, info, title)
    }

    pub fn add_window_with(&self, desktop: &str, info: ProcessInfo, title: &str) -> WindowHandle {
        let mut state = lock(&self.state);
        state.next_handle += 1;
        let handle = WindowHandle(state.next_handle);
        let pid = state.next_handle as u32;
        state.processes.insert(pid, info);
        state.windows.push(FakeWindow {
            handle,
            desktop: desktop.to_string(),
            title: title.to_string(),
            pid,
            parent: false,
            caption: true,
            exists: true,
        });
        handle
    }

    pub fn move_window(&self, handle: WindowHandle, desktop: &str) {
        self.update_window(handle, |window| window.desktop = desktop.to_string());
    }

    pub fn set_parent(&self, handle: WindowHandle, parent: bool) {
        self.update_window(handle, |window| window.parent = parent);
    }

    pub fn set_caption(&self, handle: WindowHandle, caption: bool) {
        self.update_window(handle, |window| window.caption = caption);
    }

    pub fn close_window(&self, handle: WindowHandle) {
        self.update_window(handle, |window| window.exists = false);
    }

    /// Every OS query fails while set.
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    pub fn set_create_fails(&self, fails: bool) {
        lock(&self.state).create_fails = fails;
    }

    pub fn created(&self) -> Vec<String> {
        lock(&self.state).created.clone()
    }

    pub fn switches(&self) -> Vec<String> {
        lock(&self.state).switches.clone()
    }

    fn update_window(&self, handle: WindowHandle, apply: impl FnOnce(&mut FakeWindow)) {
        let mut state = lock(&self.state);
        if let Some(window) = state.windows.iter_mut().find(|w| w.handle == handle) {
            apply(window);
        }
    }

    fn with_window<T>(&self, handle: WindowHandle, read: impl FnOnce(&FakeWindow) -> T) -> Option<T> {
        let state = lock(&self.state);
        state.windows.iter().find(|w| w.handle == handle).map(read)
    }
}

impl DesktopManager for FakeSystem {
    fn list_desktops(&self) -> Result<Vec<VirtualDesktop>> {
        let state = lock(&self.state);
        if state.failing {
            bail!("desktop manager unavailable");
        }
        Ok(state
            .desktops
            .iter()
            .enumerate()
            .map(|(index, id)| VirtualDesktop {
                id: id.clone(),
                ordinal: index as u32 + 1,
            })
            .collect())
    }

    fn current_desktop(&self) -> Result<String> {
        let state = lock(&self.state);
        if state.failing {
            bail!("desktop manager unavailable");
        }
        state
            .current
            .clone()
            .ok_or_else(|| anyhow!("no current desktop"))
    }

    fn is_window_on_desktop(&self, window: WindowHandle, desktop_id: &str) -> Result<bool> {
        let state = lock(&self.state);
        if state.failing {
            bail!("desktop manager unavailable");
        }
        Ok(state
            .windows
            .iter()
            .any(|w| w.handle == window && w.desktop == desktop_id))
    }

    fn create_desktop(&self) -> Result<String> {
        let mut state = lock(&self.state);
        if state.failing || state.create_fails {
            bail!("cannot create desktop");
        }
        let id = format!("created-{}", state.created.len() + 1);
        state.desktops.push(id.clone());
        state.created.push(id.clone());
        Ok(id)
    }

    fn switch_to_desktop(&self, desktop_id: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.desktops.iter().any(|id| id == desktop_id) {
            bail!("unknown desktop {desktop_id}");
        }
        state.current = Some(desktop_id.to_string());
        state.switches.push(desktop_id.to_string());
        Ok(())
    }
}

impl WindowSystem for FakeSystem {
    fn enumerate_windows(&self) -> Result<Vec<WindowHandle>> {
        let state = lock(&self.state);
        if state.failing {
            bail!("window system unavailable");
        }
        Ok(state.windows.iter().map(|w| w.handle).collect())
    }

    fn window_exists(&self, window: WindowHandle) -> bool {
        self.with_window(window, |w| w.exists).unwrap_or(false)
    }

    fn window_title(&self, window: WindowHandle) -> Option<String> {
        self.with_window(window, |w| w.title.clone())
    }

    fn has_parent(&self, window: WindowHandle) -> bool {
        self.with_window(window, |w| w.parent).unwrap_or(false)
    }

    fn has_caption(&self, window: WindowHandle) -> bool {
        self.with_window(window, |w| w.caption).unwrap_or(false)
    }

    fn window_pid(&self, window: WindowHandle) -> Option<u32> {
        self.with_window(window, |w| w.pid)
    }
}

impl ProcessLookup for FakeSystem {
    fn process_info(&self, pid: u32) -> Option<ProcessInfo> {
        lock(&self.state).processes.get(&pid).cloned()
    }
}

pub struct FakeTabs {
    tabs: Mutex<Vec<TabInfo>>,
    available: bool,
    failing: bool,
}

impl FakeTabs {
    pub fn with(tabs: Vec<TabInfo>) -> Self {
        Self {
            tabs: Mutex::new(tabs),
            available: true,
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            tabs: Mutex::new(Vec::new()),
            available: true,
            failing: true,
        }
    }

    pub fn set_tabs(&self, tabs: Vec<TabInfo>) {
        *lock(&self.tabs) = tabs;
    }
}

impl TabSource for FakeTabs {
    fn is_available(&self) -> bool {
        self.available
    }

    fn list_tabs(&self) -> Result<Vec<TabInfo>> {
        if self.failing {
            bail!("tab host disconnected");
        }
        Ok(lock(&self.tabs).clone())
    }
}

/// Records every launch; programs marked failing error out. Only paths
/// registered with `add_path`/`add_dir` exist.
#[derive(Default)]
pub struct FakeLauncher {
    launched: Mutex<Vec<LaunchCommand>>,
    opened: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    paths: Mutex<HashSet<String>>,
    dirs: Mutex<HashSet<String>>,
}

impl FakeLauncher {
    pub fn fail_program(&self, program: &str) {
        lock(&self.failing).insert(program.to_string());
    }

    pub fn add_path(&self, path: &str) {
        lock(&self.paths).insert(path.to_string());
    }

    pub fn add_dir(&self, path: &str) {
        lock(&self.dirs).insert(path.to_string());
    }

    pub fn launched(&self) -> Vec<LaunchCommand> {
        lock(&self.launched).clone()
    }

    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, command: &LaunchCommand) -> Result<()> {
        if lock(&self.failing).contains(&command.program) {
            bail!("failed to spawn {}", command.program);
        }
        lock(&self.launched).push(command.clone());
        Ok(())
    }

    fn open_default(&self, target: &str) -> Result<()> {
        lock(&self.opened).push(target.to_string());
        Ok(())
    }

    fn path_exists(&self, path: &str) -> bool {
        lock(&self.paths).contains(path) || lock(&self.dirs).contains(path)
    }

    fn is_dir(&self, path: &str) -> bool {
        lock(&self.dirs).contains(path)
    }
}

pub fn window(exe_name: &str, title: &str) -> WindowInfo {
    WindowInfo {
        handle: 1,
        title: title.to_string(),
        exe_path: format!("C:\\Apps\\{exe_name}"),
        exe_name: exe_name.to_string(),
        pid: 1,
        working_dir: None,
        cmd_args: Vec::new(),
    }
}

pub fn tab(url: &str) -> TabInfo {
    TabInfo {
        id: url.to_string(),
        url: url.to_string(),
        title: url.to_string(),
    }
}

/// A manager over a scratch database and a fake OS.
pub struct Harness {
    _dir: TempDir,
    pub db: Database,
    pub system: Arc<FakeSystem>,
    pub tabs: Arc<FakeTabs>,
    pub manager: SessionManager,
    pub events: broadcast::Receiver<DaemonEvent>,
}

impl Harness {
    pub fn new(desktops: &[&str]) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let db = Database::new(dir.path().join("desksession.sqlite3")).expect("database");
        let system = FakeSystem::with_desktops(desktops);
        let tabs = Arc::new(FakeTabs::with(Vec::new()));
        let bus = EventBus::new();
        let events = bus.subscribe();
        let manager = SessionManager::new(
            db.clone(),
            system.platform(),
            tabs.clone(),
            bus,
            &DaemonSettings::default(),
        );

        Self {
            _dir: dir,
            db,
            system,
            tabs,
            manager,
            events,
        }
    }

    /// Stores a session directly, bypassing the manager.
    pub async fn seed_session(&self, name: &str, desktop_id: &str) -> Session {
        self.db
            .create_session(&Session::new(name, Some(desktop_id), Utc::now()))
            .await
            .expect("seed session")
    }

    pub fn drain_events(&mut self) -> Vec<DaemonEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
