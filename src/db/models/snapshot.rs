use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One window observed on a desktop at capture time.
///
/// This is the capture-side record; the persisted form is [`CapturedWindow`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub handle: u64,
    pub title: String,
    pub exe_path: String,
    pub exe_name: String,
    pub pid: u32,
    pub working_dir: Option<String>,
    pub cmd_args: Vec<String>,
}

/// A browser tab as reported by the tab lister.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: String,
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapturedWindow {
    pub id: i64,
    pub session_id: String,
    pub snapshot_id: Option<String>,
    pub handle: u64,
    pub title: String,
    pub exe_path: String,
    pub exe_name: String,
    pub pid: u32,
    pub working_dir: Option<String>,
    pub cmd_args: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

impl From<CapturedWindow> for WindowInfo {
    fn from(window: CapturedWindow) -> Self {
        Self {
            handle: window.handle,
            title: window.title,
            exe_path: window.exe_path,
            exe_name: window.exe_name,
            pid: window.pid,
            working_dir: window.working_dir,
            cmd_args: window.cmd_args,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrowserTab {
    pub id: i64,
    pub session_id: String,
    pub snapshot_id: Option<String>,
    pub tab_id: String,
    pub title: String,
    pub url: String,
    pub captured_at: DateTime<Utc>,
}

impl From<BrowserTab> for TabInfo {
    fn from(tab: BrowserTab) -> Self {
        Self {
            id: tab.tab_id,
            url: tab.url,
            title: tab.title,
        }
    }
}

/// Append-only record of one capture event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: String,
    pub session_id: String,
    pub captured_at: DateTime<Utc>,
    pub window_count: u64,
    pub tab_count: u64,
}

/// What `save_snapshot` ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A snapshot row was appended and the latest window set replaced.
    Written {
        snapshot_id: String,
        window_count: usize,
        tab_count: usize,
        tabs_retained: bool,
    },
    /// The capture was empty while known-good windows exist; only bookkeeping
    /// columns were touched.
    Retained,
}
