use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// One change in the virtual-desktop topology between two polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyEvent {
    Created {
        desktop_id: String,
    },
    Removed {
        desktop_id: String,
        /// Desktop that is active after the removal; salvage looks there.
        now_active: String,
    },
    Switched {
        from: String,
        to: String,
    },
}

/// Shared counter of desktop creations the watcher should not announce.
#[derive(Debug, Clone, Default)]
pub struct SuppressHandle {
    pending: Arc<AtomicU32>,
}

impl SuppressHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next newly seen desktop is swallowed instead of raising a prompt.
    pub fn suppress_next_new_desktop(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// Undoes one suppression after a programmatic creation failed.
    pub fn release(&self) {
        let _ = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::SeqCst)
    }

    fn consume(&self) -> bool {
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[derive(Debug, Clone)]
struct Baseline {
    ids: Vec<String>,
    active: String,
}

/// Pure diff over successive desktop polls. The caller only feeds
/// successful polls, so a failed read leaves the previous baseline intact.
#[derive(Debug)]
pub struct DesktopWatcher {
    baseline: Option<Baseline>,
    suppress: SuppressHandle,
}

impl DesktopWatcher {
    pub fn new(suppress: SuppressHandle) -> Self {
        Self {
            baseline: None,
            suppress,
        }
    }

    pub fn suppress_handle(&self) -> SuppressHandle {
        self.suppress.clone()
    }

    pub fn is_primed(&self) -> bool {
        self.baseline.is_some()
    }

    /// Records a poll and returns what changed since the last one, creations
    /// and removals before the switch. A switch onto a brand-new desktop is
    /// reported as both `Created` and `Switched`. The first poll only sets the baseline.
    pub fn observe(&mut self, ids: Vec<String>, active: String) -> Vec<TopologyEvent> {
        let Some(previous) = self.baseline.take() else {
            self.baseline = Some(Baseline { ids, active });
            return Vec::new();
        };

        let before: HashSet<&str> = previous.ids.iter().map(String::as_str).collect();
        let after: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut events = Vec::new();

        let added: Vec<&String> = ids.iter().filter(|id| !before.contains(id.as_str())).collect();
        for desktop_id in &added {
            if self.suppress.consume() {
                log::info!("desktop {} created programmatically, not prompting", desktop_id);
                continue;
            }
            events.push(TopologyEvent::Created {
                desktop_id: desktop_id.to_string(),
            });
        }

        for desktop_id in previous.ids.iter().filter(|id| !after.contains(id.as_str())) {
            events.push(TopologyEvent::Removed {
                desktop_id: desktop_id.clone(),
                now_active: active.clone(),
            });
        }

        // Focus can land on a desktop created this tick (Win+Ctrl+D); the
        // desktop that lost focus still needs its session paused.
        if active != previous.active {
            events.push(TopologyEvent::Switched {
                from: previous.active.clone(),
                to: active.clone(),
            });
        }

        self.baseline = Some(Baseline { ids, active });
        events
    }
}
