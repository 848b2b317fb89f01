//! Turns a stored snapshot into launch commands.

use std::collections::HashSet;

use crate::capture::is_restorable_url;
use crate::db::{TabInfo, WindowInfo};

use super::launcher::{LaunchCommand, Launcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCategory {
    Browser,
    Editor,
    Terminal,
    Other,
    /// Shell windows that relaunch themselves.
    Skip,
}

const BROWSER_EXES: &[&str] = &[
    "chrome.exe",
    "msedge.exe",
    "firefox.exe",
    "brave.exe",
    "opera.exe",
];

const EDITOR_EXES: &[&str] = &["code.exe", "code - insiders.exe"];

/// Terminal executable → command that opens a fresh window of it.
const TERMINAL_COMMANDS: &[(&str, &str)] = &[
    ("windowsterminal.exe", "wt"),
    ("wt.exe", "wt"),
    ("cmd.exe", "cmd"),
    ("powershell.exe", "powershell"),
    ("pwsh.exe", "pwsh"),
];

const SKIPPED_EXES: &[&str] = &["explorer.exe", "dwm.exe"];

const EDITOR_TITLE_SUFFIXES: &[&str] = &[" — Visual Studio Code", " - Visual Studio Code"];

/// Well-known browser install locations, most preferred first. Relative
/// entries resolve against the per-user local data directory.
const BROWSER_INSTALL_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
    r"Microsoft\Edge\Application\msedge.exe",
];

pub fn categorize(exe_name: &str) -> AppCategory {
    let exe = exe_name.to_lowercase();
    if BROWSER_EXES.contains(&exe.as_str()) {
        AppCategory::Browser
    } else if EDITOR_EXES.contains(&exe.as_str()) {
        AppCategory::Editor
    } else if terminal_command(&exe).is_some() {
        AppCategory::Terminal
    } else if SKIPPED_EXES.contains(&exe.as_str()) {
        AppCategory::Skip
    } else {
        AppCategory::Other
    }
}

fn terminal_command(exe_lower: &str) -> Option<&'static str> {
    TERMINAL_COMMANDS
        .iter()
        .find(|(exe, _)| *exe == exe_lower)
        .map(|(_, command)| *command)
}

/// Folder name an editor shows in its title: `file — folder — Visual Studio
/// Code` yields `folder`.
pub fn title_folder_hint(title: &str) -> Option<String> {
    let mut trimmed = title;
    for suffix in EDITOR_TITLE_SUFFIXES {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            trimmed = stripped;
            break;
        }
    }

    let separator = if trimmed.contains(" — ") { " — " } else { " - " };
    let parts: Vec<&str> = trimmed.split(separator).collect();
    if parts.len() < 2 {
        return None;
    }
    let hint = parts[parts.len() - 1].trim();
    (!hint.is_empty()).then(|| hint.to_string())
}

/// Display name for common executables.
pub fn friendly_app_name(exe_name: &str) -> String {
    let name = match exe_name.to_lowercase().as_str() {
        "code.exe" => "VS Code",
        "chrome.exe" => "Chrome",
        "firefox.exe" => "Firefox",
        "msedge.exe" => "Edge",
        "brave.exe" => "Brave",
        "opera.exe" => "Opera",
        "sumatrapdf.exe" => "Sumatra PDF",
        "acrord32.exe" => "Adobe Reader",
        "acrobat.exe" => "Adobe Acrobat",
        "winword.exe" => "Word",
        "excel.exe" => "Excel",
        "powerpnt.exe" => "PowerPoint",
        "notepad.exe" => "Notepad",
        "notepad++.exe" => "Notepad++",
        "windowsterminal.exe" | "wt.exe" => "Terminal",
        "cmd.exe" => "CMD",
        "powershell.exe" | "pwsh.exe" => "PowerShell",
        "python.exe" | "pythonw.exe" => "Python",
        "pycharm64.exe" => "PyCharm",
        "idea64.exe" => "IntelliJ",
        "webstorm64.exe" => "WebStorm",
        "postman.exe" => "Postman",
        "slack.exe" => "Slack",
        "discord.exe" => "Discord",
        "obsidian.exe" => "Obsidian",
        "figma.exe" => "Figma",
        "teams.exe" => "Teams",
        "zoom.exe" => "Zoom",
        "vlc.exe" => "VLC",
        "mspaint.exe" => "Paint",
        "devenv.exe" => "Visual Studio",
        _ => return strip_exe_suffix(exe_name).to_string(),
    };
    name.to_string()
}

fn strip_exe_suffix(exe_name: &str) -> &str {
    let split = exe_name.len().saturating_sub(4);
    match (exe_name.get(..split), exe_name.get(split..)) {
        (Some(stem), Some(ext)) if ext.eq_ignore_ascii_case(".exe") => stem,
        _ => exe_name,
    }
}

/// Joins with the separator style `base` already uses, so captured Windows
/// paths stay Windows paths.
fn join_path(base: &str, child: &str) -> String {
    let separator = if base.contains('\\') { '\\' } else { '/' };
    format!("{}{}{}", base.trim_end_matches(['\\', '/']), separator, child)
}

/// Everything a restore will try to start, already deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestorePlan {
    pub urls: Vec<String>,
    /// Browser to open `urls` with; `None` falls back to the system default.
    pub browser: Option<String>,
    pub editors: Vec<LaunchCommand>,
    pub terminals: Vec<LaunchCommand>,
    pub other: Vec<LaunchCommand>,
}

impl RestorePlan {
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
            && self.editors.is_empty()
            && self.terminals.is_empty()
            && self.other.is_empty()
    }

    pub fn len(&self) -> usize {
        self.urls.len() + self.editors.len() + self.terminals.len() + self.other.len()
    }
}

pub fn build_plan(
    windows: &[WindowInfo],
    tabs: &[TabInfo],
    preferred_browser: Option<&str>,
    launcher: &dyn Launcher,
) -> RestorePlan {
    let mut plan = RestorePlan::default();

    let mut seen_urls = HashSet::new();
    for tab in tabs {
        if is_restorable_url(&tab.url) && seen_urls.insert(tab.url.clone()) {
            plan.urls.push(tab.url.clone());
        }
    }

    let mut seen_editors = HashSet::new();
    let mut seen_terminals = HashSet::new();
    let mut seen_other = HashSet::new();
    let mut captured_browser: Option<String> = None;

    for window in windows {
        match categorize(&window.exe_name) {
            AppCategory::Browser => {
                if captured_browser.is_none() && launcher.path_exists(&window.exe_path) {
                    captured_browser = Some(window.exe_path.clone());
                }
            }
            AppCategory::Editor => {
                let dir = editor_dir(window, launcher);
                let key = (window.exe_name.to_lowercase(), dir.clone());
                if !seen_editors.insert(key) {
                    continue;
                }
                let program = if launcher.path_exists(&window.exe_path) {
                    window.exe_path.clone()
                } else {
                    "code".to_string()
                };
                let command = match dir {
                    Some(dir) => LaunchCommand::new(program).arg(dir),
                    None => LaunchCommand::new(program),
                };
                plan.editors.push(command);
            }
            AppCategory::Terminal => {
                let exe = window.exe_name.to_lowercase();
                let Some(program) = terminal_command(&exe) else {
                    continue;
                };
                let dir = window
                    .working_dir
                    .clone()
                    .filter(|dir| launcher.is_dir(dir));
                if !seen_terminals.insert((program, dir.clone())) {
                    continue;
                }
                let mut command = LaunchCommand::new(program);
                if let (Some(dir), "wt") = (dir.as_deref(), program) {
                    command = command.args(["-d", dir]);
                }
                plan.terminals.push(command.current_dir(dir));
            }
            AppCategory::Other => {
                if window.exe_path.is_empty() || !launcher.path_exists(&window.exe_path) {
                    continue;
                }
                if !seen_other.insert(window.exe_path.to_lowercase()) {
                    continue;
                }
                plan.other.push(
                    LaunchCommand::new(window.exe_path.clone())
                        .args(window.cmd_args.iter().skip(1).cloned())
                        .current_dir(window.working_dir.clone()),
                );
            }
            AppCategory::Skip => {}
        }
    }

    if !plan.urls.is_empty() {
        plan.browser = preferred_browser
            .filter(|path| launcher.path_exists(path))
            .map(str::to_string)
            .or(captured_browser)
            .or_else(|| discover_browser(launcher));
    }
    plan
}

/// Working directory for an editor window: the folder named in its title if
/// that resolves, otherwise the process working directory.
fn editor_dir(window: &WindowInfo, launcher: &dyn Launcher) -> Option<String> {
    if let Some(hint) = title_folder_hint(&window.title) {
        if launcher.is_dir(&hint) {
            return Some(hint);
        }
        if let Some(cwd) = window.working_dir.as_deref() {
            let joined = join_path(cwd, &hint);
            if launcher.is_dir(&joined) {
                return Some(joined);
            }
        }
    }
    window
        .working_dir
        .clone()
        .filter(|dir| launcher.is_dir(dir))
}

fn discover_browser(launcher: &dyn Launcher) -> Option<String> {
    let local = dirs::data_local_dir();
    BROWSER_INSTALL_PATHS.iter().find_map(|path| {
        let candidate = if path.contains(':') {
            path.to_string()
        } else {
            local.as_ref()?.join(path).to_string_lossy().into_owned()
        };
        launcher.path_exists(&candidate).then_some(candidate)
    })
}

/// Human-readable summary of what a restore would reopen.
pub fn restore_preview(windows: &[WindowInfo], tabs: &[TabInfo]) -> Vec<String> {
    let mut items = Vec::new();
    let tab_count = tabs
        .iter()
        .filter(|tab| is_restorable_url(&tab.url))
        .count();
    if tab_count > 0 {
        let plural = if tab_count == 1 { "" } else { "s" };
        items.push(format!("🌐 {tab_count} browser tab{plural}"));
    }

    let mut apps: Vec<(String, usize)> = Vec::new();
    for window in windows {
        if window.exe_name.is_empty() || categorize(&window.exe_name) == AppCategory::Skip {
            continue;
        }
        let name = friendly_app_name(&window.exe_name);
        match apps.iter_mut().find(|(seen, _)| *seen == name) {
            Some((_, count)) => *count += 1,
            None => apps.push((name, 1)),
        }
    }
    // Stable: ties keep first-seen order.
    apps.sort_by(|a, b| b.1.cmp(&a.1));

    for (name, count) in apps {
        if count > 1 {
            items.push(format!("🪟 {name} ({count} windows)"));
        } else {
            items.push(format!("🪟 {name}"));
        }
    }
    items
}
