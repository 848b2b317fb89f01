pub mod session;
pub mod snapshot;

pub use session::{format_duration, Session, SessionStats, SessionStatus, STATS_APP_LIMIT};
pub use snapshot::{BrowserTab, CapturedWindow, SaveOutcome, Snapshot, TabInfo, WindowInfo};
