use serde::Serialize;
use tokio::sync::broadcast;

use crate::db::{SessionStatus, TabInfo};

const EVENT_BUS_CAPACITY: usize = 256;

/// Notifications for whatever presentation layer is attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DaemonEvent {
    /// An untracked desktop appeared; answer with `create_session` or
    /// `cancel_pending_prompt`.
    #[serde(rename_all = "camelCase")]
    NewDesktopDetected { desktop_id: String },
    #[serde(rename_all = "camelCase")]
    SnapshotSaved { session_id: String },
    #[serde(rename_all = "camelCase")]
    TabsReceived {
        session_id: String,
        tabs: Vec<TabInfo>,
    },
    #[serde(rename_all = "camelCase")]
    SessionStatusChanged {
        session_id: String,
        status: SessionStatus,
    },
}

/// Fan-out bus. Publishing with no subscribers is not an error; slow
/// subscribers lag and skip rather than block the daemon.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DaemonEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: DaemonEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
