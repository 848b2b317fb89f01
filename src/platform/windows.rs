use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use windows::core::GUID;
use windows::Win32::Foundation::{BOOL, HWND, LPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetParent, GetWindowLongW, GetWindowTextLengthW, GetWindowTextW,
    GetWindowThreadProcessId, IsWindow, GWL_STYLE, WS_CAPTION,
};

use super::{DesktopManager, VirtualDesktop, WindowHandle, WindowSystem};

fn vd_error(err: winvd::Error) -> anyhow::Error {
    anyhow!("virtual desktop API failed: {err:?}")
}

fn guid_string(guid: &GUID) -> String {
    format!("{guid:?}")
}

fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as isize as *mut core::ffi::c_void)
}

/// Win32 windows plus the undocumented virtual desktop COM interfaces (via
/// `winvd`).
pub struct Win32Desktops {
    /// id → desktop, refreshed by every `list_desktops` call and on cache miss.
    known: Mutex<Vec<(String, winvd::Desktop)>>,
}

impl Win32Desktops {
    pub fn new() -> Self {
        Self {
            known: Mutex::new(Vec::new()),
        }
    }

    fn refresh(&self) -> Result<Vec<(String, winvd::Desktop)>> {
        let mut entries = Vec::new();
        for desktop in winvd::get_desktops().map_err(vd_error)? {
            let id = guid_string(&desktop.get_id().map_err(vd_error)?);
            entries.push((id, desktop));
        }
        let mut known = match self.known.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *known = entries.clone();
        Ok(entries)
    }

    fn desktop(&self, desktop_id: &str) -> Result<winvd::Desktop> {
        {
            let known = match self.known.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some((_, desktop)) = known.iter().find(|(id, _)| id == desktop_id) {
                return Ok(*desktop);
            }
        }
        match self.refresh()?.into_iter().find(|(id, _)| id == desktop_id) {
            Some((_, desktop)) => Ok(desktop),
            None => bail!("desktop {desktop_id} no longer exists"),
        }
    }
}

impl DesktopManager for Win32Desktops {
    fn list_desktops(&self) -> Result<Vec<VirtualDesktop>> {
        Ok(self
            .refresh()?
            .into_iter()
            .enumerate()
            .map(|(index, (id, _))| VirtualDesktop {
                id,
                ordinal: index as u32 + 1,
            })
            .collect())
    }

    fn current_desktop(&self) -> Result<String> {
        let desktop = winvd::get_current_desktop().map_err(vd_error)?;
        Ok(guid_string(&desktop.get_id().map_err(vd_error)?))
    }

    fn is_window_on_desktop(&self, window: WindowHandle, desktop_id: &str) -> Result<bool> {
        let desktop = self.desktop(desktop_id)?;
        winvd::is_window_on_desktop(desktop, hwnd(window)).map_err(vd_error)
    }

    fn create_desktop(&self) -> Result<String> {
        let desktop = winvd::create_desktop().map_err(vd_error)?;
        let id = guid_string(&desktop.get_id().map_err(vd_error)?);
        self.refresh()?;
        Ok(id)
    }

    fn switch_to_desktop(&self, desktop_id: &str) -> Result<()> {
        let desktop = self.desktop(desktop_id)?;
        winvd::switch_desktop(desktop).map_err(vd_error)
    }
}

unsafe extern "system" fn collect_window(window: HWND, lparam: LPARAM) -> BOOL {
    let handles = &mut *(lparam.0 as *mut Vec<WindowHandle>);
    handles.push(WindowHandle(window.0 as usize as u64));
    BOOL(1)
}

impl WindowSystem for Win32Desktops {
    fn enumerate_windows(&self) -> Result<Vec<WindowHandle>> {
        let mut handles: Vec<WindowHandle> = Vec::new();
        unsafe {
            EnumWindows(
                Some(collect_window),
                LPARAM(&mut handles as *mut Vec<WindowHandle> as isize),
            )
        }
        .map_err(|err| anyhow!("EnumWindows failed: {err}"))?;
        Ok(handles)
    }

    fn window_exists(&self, window: WindowHandle) -> bool {
        unsafe { IsWindow(hwnd(window)).as_bool() }
    }

    fn window_title(&self, window: WindowHandle) -> Option<String> {
        unsafe {
            let len = GetWindowTextLengthW(hwnd(window));
            if len <= 0 {
                return None;
            }
            let mut buffer = vec![0u16; len as usize + 1];
            let copied = GetWindowTextW(hwnd(window), &mut buffer);
            if copied <= 0 {
                return None;
            }
            Some(String::from_utf16_lossy(&buffer[..copied as usize]))
        }
    }

    fn has_parent(&self, window: WindowHandle) -> bool {
        match unsafe { GetParent(hwnd(window)) } {
            Ok(parent) => !parent.0.is_null(),
            Err(_) => false,
        }
    }

    fn has_caption(&self, window: WindowHandle) -> bool {
        let style = unsafe { GetWindowLongW(hwnd(window), GWL_STYLE) } as u32;
        style & WS_CAPTION.0 == WS_CAPTION.0
    }

    fn window_pid(&self, window: WindowHandle) -> Option<u32> {
        let mut pid = 0u32;
        unsafe { GetWindowThreadProcessId(hwnd(window), Some(&mut pid)) };
        (pid != 0).then_some(pid)
    }
}
