//! Which top-level windows count as user work.

use std::collections::HashSet;

/// Windows with shorter titles are tooltips, drag shadows and the like.
pub const MIN_TITLE_LEN: usize = 2;

/// Shell and system processes that own captioned top-level windows but are
/// never worth restoring.
const DEFAULT_EXCLUDED_EXES: &[&str] = &[
    "explorer.exe",
    "dwm.exe",
    "winlogon.exe",
    "csrss.exe",
    "svchost.exe",
    "lsass.exe",
    "services.exe",
    "smss.exe",
    "taskhost.exe",
    "conhost.exe",
    "searchui.exe",
    "shellexperiencehost.exe",
    "applicationframehost.exe",
    "systemsettings.exe",
    "textinputhost.exe",
];

/// Case-insensitive executable denylist.
#[derive(Debug, Clone)]
pub struct WindowFilter {
    excluded: HashSet<String>,
}

impl WindowFilter {
    /// Built-in denylist plus this tool's own executable and any configured
    /// extras.
    pub fn new<I, S>(extra_excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut excluded: HashSet<String> = DEFAULT_EXCLUDED_EXES
            .iter()
            .map(|name| name.to_string())
            .collect();

        if let Some(own) = own_exe_name() {
            excluded.insert(own.to_lowercase());
        }
        for name in extra_excluded {
            let name = name.as_ref().trim();
            if !name.is_empty() {
                excluded.insert(name.to_lowercase());
            }
        }

        Self { excluded }
    }

    pub fn is_excluded_exe(&self, exe_name: &str) -> bool {
        self.excluded.contains(&exe_name.to_lowercase())
    }

    pub fn title_is_capturable(title: &str) -> bool {
        title.chars().count() >= MIN_TITLE_LEN
    }
}

impl Default for WindowFilter {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}

/// Whether `exe_name` is on the built-in system denylist. Configured extras
/// are not consulted.
pub fn is_system_exe(exe_name: &str) -> bool {
    let lower = exe_name.to_lowercase();
    DEFAULT_EXCLUDED_EXES.contains(&lower.as_str())
}

fn own_exe_name() -> Option<String> {
    let exe = std::env::current_exe().ok()?;
    exe.file_name().map(|name| name.to_string_lossy().into_owned())
}
