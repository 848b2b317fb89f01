mod connection;
pub mod helpers;
pub mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::{
    format_duration, BrowserTab, CapturedWindow, SaveOutcome, Session, SessionStats, SessionStatus, Snapshot,
    TabInfo, WindowInfo,
};
