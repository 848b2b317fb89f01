//! Operating-system seams.
//!
//! Everything the engine needs from the OS goes through three traits so the
//! tracking logic can be driven by fakes in tests:
//! - [`DesktopManager`]: virtual desktops and window-to-desktop membership
//! - [`WindowSystem`]: top-level window enumeration and per-window queries
//! - [`ProcessLookup`]: pid → executable metadata
//!
//! All methods are blocking; async callers wrap them in `spawn_blocking`.

mod processes;

#[cfg(windows)]
mod windows;
#[cfg(not(windows))]
mod unsupported;

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use processes::{ProcessInfo, SysinfoProcesses};

/// Opaque native window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowHandle(pub u64);

/// A live virtual desktop as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDesktop {
    pub id: String,
    /// 1-based display position; shifts as desktops come and go.
    pub ordinal: u32,
}

pub trait DesktopManager: Send + Sync {
    fn list_desktops(&self) -> Result<Vec<VirtualDesktop>>;

    fn current_desktop(&self) -> Result<String>;

    /// Membership test for one window against one desktop. This is the only
    /// attribution query the capture engine relies on.
    fn is_window_on_desktop(&self, window: WindowHandle, desktop_id: &str) -> Result<bool>;

    /// Creates a desktop and returns its id. Does not switch to it.
    fn create_desktop(&self) -> Result<String>;

    fn switch_to_desktop(&self, desktop_id: &str) -> Result<()>;
}

pub trait WindowSystem: Send + Sync {
    /// Every top-level window on every desktop, visible or not.
    fn enumerate_windows(&self) -> Result<Vec<WindowHandle>>;

    fn window_exists(&self, window: WindowHandle) -> bool;

    fn window_title(&self, window: WindowHandle) -> Option<String>;

    fn has_parent(&self, window: WindowHandle) -> bool;

    /// Whether the window style carries a title bar.
    fn has_caption(&self, window: WindowHandle) -> bool;

    fn window_pid(&self, window: WindowHandle) -> Option<u32>;
}

pub trait ProcessLookup: Send + Sync {
    fn process_info(&self, pid: u32) -> Option<ProcessInfo>;
}

/// The set of OS collaborators the daemon runs against.
#[derive(Clone)]
pub struct Platform {
    pub desktops: Arc<dyn DesktopManager>,
    pub windows: Arc<dyn WindowSystem>,
    pub processes: Arc<dyn ProcessLookup>,
}

impl Platform {
    /// Native backend for the current OS.
    pub fn native() -> Self {
        #[cfg(windows)]
        {
            let backend = Arc::new(windows::Win32Desktops::new());
            Self {
                desktops: backend.clone(),
                windows: backend,
                processes: Arc::new(SysinfoProcesses::new()),
            }
        }

        #[cfg(not(windows))]
        {
            let backend = Arc::new(unsupported::UnsupportedPlatform);
            Self {
                desktops: backend.clone(),
                windows: backend,
                processes: Arc::new(SysinfoProcesses::new()),
            }
        }
    }
}
