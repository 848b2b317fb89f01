use anyhow::{bail, Result};

use super::{DesktopManager, VirtualDesktop, WindowHandle, WindowSystem};

/// Backend for systems without a virtual-desktop API we can drive.
///
/// Desktop queries fail (the watcher logs and retries) and window enumeration
/// comes back empty, which capture treats as "unavailable".
pub struct UnsupportedPlatform;

impl DesktopManager for UnsupportedPlatform {
    fn list_desktops(&self) -> Result<Vec<VirtualDesktop>> {
        bail!("virtual desktops are only supported on Windows")
    }

    fn current_desktop(&self) -> Result<String> {
        bail!("virtual desktops are only supported on Windows")
    }

    fn is_window_on_desktop(&self, _window: WindowHandle, _desktop_id: &str) -> Result<bool> {
        Ok(false)
    }

    fn create_desktop(&self) -> Result<String> {
        bail!("creating virtual desktops is only supported on Windows")
    }

    fn switch_to_desktop(&self, _desktop_id: &str) -> Result<()> {
        bail!("switching virtual desktops is only supported on Windows")
    }
}

impl WindowSystem for UnsupportedPlatform {
    fn enumerate_windows(&self) -> Result<Vec<WindowHandle>> {
        Ok(Vec::new())
    }

    fn window_exists(&self, _window: WindowHandle) -> bool {
        false
    }

    fn window_title(&self, _window: WindowHandle) -> Option<String> {
        None
    }

    fn has_parent(&self, _window: WindowHandle) -> bool {
        false
    }

    fn has_caption(&self, _window: WindowHandle) -> bool {
        false
    }

    fn window_pid(&self, _window: WindowHandle) -> Option<u32> {
        None
    }
}
