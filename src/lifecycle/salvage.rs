use std::collections::HashSet;

use crate::db::WindowInfo;

/// Picks the windows a removed desktop's session should keep.
///
/// When a desktop is closed the OS moves its windows to the neighbouring
/// desktop. Any window there whose executable the session already knew about
/// is taken back. `None` means nothing matched and the stored list stays.
pub fn salvage_windows(
    known_exe_names: &[String],
    now_active_windows: &[WindowInfo],
) -> Option<Vec<WindowInfo>> {
    let known: HashSet<String> = known_exe_names
        .iter()
        .filter(|name| !name.is_empty())
        .map(|name| name.to_lowercase())
        .collect();
    if known.is_empty() {
        return None;
    }

    let salvaged: Vec<WindowInfo> = now_active_windows
        .iter()
        .filter(|window| known.contains(&window.exe_name.to_lowercase()))
        .cloned()
        .collect();

    (!salvaged.is_empty()).then_some(salvaged)
}
