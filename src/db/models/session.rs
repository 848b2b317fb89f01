//! Session-related data models.
//!
//! - `Session`, `SessionStatus`: the durable unit of tracked work, bound to at
//!   most one virtual desktop.
//! - `SessionStats`: aggregated view used by the dashboard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SESSION_ICON: &str = "🗂";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Idle,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Idle => "idle",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub description: String,
    pub status: SessionStatus,
    pub desktop_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_snapshot_at: Option<DateTime<Utc>>,
    pub total_seconds: u64,
}

impl Session {
    /// A freshly named session, bound to `desktop_id` and immediately active.
    pub fn new(name: &str, desktop_id: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            icon: DEFAULT_SESSION_ICON.to_string(),
            description: String::new(),
            status: SessionStatus::Active,
            desktop_id: desktop_id.map(str::to_string),
            created_at: now,
            updated_at: now,
            last_snapshot_at: None,
            total_seconds: 0,
        }
    }
}

/// Dashboard summary for one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub app_count: usize,
    /// Unique executable names, capped to `STATS_APP_LIMIT` for display.
    pub apps: Vec<String>,
    pub tab_count: usize,
    pub window_count: usize,
    pub duration: String,
}

pub const STATS_APP_LIMIT: usize = 6;

/// Buckets a duration as `<1m`, `Nm` or `Nh Mm`.
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let mins = (total_seconds % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {mins}m")
    } else if mins > 0 {
        format!("{mins}m")
    } else {
        "<1m".to_string()
    }
}
