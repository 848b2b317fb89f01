//! Browser tab listing seam. The transport that talks to the browser lives
//! outside this crate; the engine only sees [`TabSource`].

use anyhow::Result;

use crate::db::TabInfo;

/// Internal browser pages that are never worth restoring.
pub const SKIP_URL_PREFIXES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "edge://",
    "devtools://",
    "about:",
    "data:",
    "view-source:",
];

pub trait TabSource: Send + Sync {
    fn is_available(&self) -> bool;

    /// Open tabs, unfiltered. Blocking.
    fn list_tabs(&self) -> Result<Vec<TabInfo>>;
}

/// Used when no tab host is configured; capture then keeps stored tabs.
pub struct NoTabSource;

impl TabSource for NoTabSource {
    fn is_available(&self) -> bool {
        false
    }

    fn list_tabs(&self) -> Result<Vec<TabInfo>> {
        Ok(Vec::new())
    }
}

pub fn is_restorable_url(url: &str) -> bool {
    let url = url.trim();
    !url.is_empty() && !SKIP_URL_PREFIXES.iter().any(|prefix| url.starts_with(prefix))
}

pub fn filter_tabs(tabs: Vec<TabInfo>) -> Vec<TabInfo> {
    tabs.into_iter()
        .filter(|tab| is_restorable_url(&tab.url))
        .collect()
}

/// Lists tabs from `source`, swallowing failures into an empty list so a
/// broken tab host never blocks a window capture.
pub fn collect_tabs(source: &dyn TabSource) -> Vec<TabInfo> {
    if !source.is_available() {
        return Vec::new();
    }
    match source.list_tabs() {
        Ok(tabs) => filter_tabs(tabs),
        Err(err) => {
            log::warn!("tab listing failed: {err:?}");
            Vec::new()
        }
    }
}
