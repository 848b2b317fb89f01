mod engine;
mod filters;
mod tabs;

pub use engine::{DesktopWindows, WindowSnapshotEngine};
pub use filters::{is_system_exe, WindowFilter, MIN_TITLE_LEN};
pub use tabs::{collect_tabs, filter_tabs, is_restorable_url, NoTabSource, TabSource};
