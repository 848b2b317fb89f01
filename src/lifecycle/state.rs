use std::collections::{HashMap, HashSet};

use tokio::time::{Duration, Instant};

/// In-memory view of which session lives on which desktop. Only mutated after
/// the matching database write has committed.
#[derive(Debug, Default)]
pub struct TrackerState {
    /// desktop id → session id, for non-idle sessions only.
    bindings: HashMap<String, String>,
    /// Desktops with a naming prompt currently open.
    pending_prompts: HashSet<String>,
    /// Session currently `active` in the store.
    active_session: Option<String>,
    last_prompt_request: Option<Instant>,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `session_id` to `desktop_id`, dropping any older binding of the
    /// same session. Returns the session previously bound to the desktop.
    pub fn bind(&mut self, desktop_id: &str, session_id: &str) -> Option<String> {
        self.bindings.retain(|_, bound| bound.as_str() != session_id);
        self.pending_prompts.remove(desktop_id);
        self.bindings
            .insert(desktop_id.to_string(), session_id.to_string())
            .filter(|previous| previous != session_id)
    }

    pub fn unbind_desktop(&mut self, desktop_id: &str) -> Option<String> {
        let session_id = self.bindings.remove(desktop_id)?;
        if self.active_session.as_deref() == Some(session_id.as_str()) {
            self.active_session = None;
        }
        Some(session_id)
    }

    pub fn unbind_session(&mut self, session_id: &str) {
        let desktop = self.desktop_for(session_id);
        if let Some(desktop_id) = desktop {
            self.unbind_desktop(&desktop_id);
        }
        if self.active_session.as_deref() == Some(session_id) {
            self.active_session = None;
        }
    }

    pub fn session_for(&self, desktop_id: &str) -> Option<&str> {
        self.bindings.get(desktop_id).map(String::as_str)
    }

    pub fn desktop_for(&self, session_id: &str) -> Option<String> {
        self.bindings
            .iter()
            .find(|(_, bound)| bound.as_str() == session_id)
            .map(|(desktop, _)| desktop.clone())
    }

    pub fn bindings(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .bindings
            .iter()
            .map(|(desktop, session)| (desktop.clone(), session.clone()))
            .collect();
        pairs.sort();
        pairs
    }

    pub fn is_tracked(&self, desktop_id: &str) -> bool {
        self.bindings.contains_key(desktop_id)
    }

    /// Marks a prompt as open; false when one is already pending.
    pub fn begin_prompt(&mut self, desktop_id: &str) -> bool {
        self.pending_prompts.insert(desktop_id.to_string())
    }

    pub fn clear_prompt(&mut self, desktop_id: &str) -> bool {
        self.pending_prompts.remove(desktop_id)
    }

    pub fn has_pending_prompt(&self, desktop_id: &str) -> bool {
        self.pending_prompts.contains(desktop_id)
    }

    /// Records `session_id` as the single active session and returns the
    /// one it displaced.
    pub fn mark_active(&mut self, session_id: &str) -> Option<String> {
        let previous = self.active_session.replace(session_id.to_string());
        previous.filter(|previous| previous != session_id)
    }

    pub fn clear_active_if(&mut self, session_id: &str) {
        if self.active_session.as_deref() == Some(session_id) {
            self.active_session = None;
        }
    }

    pub fn active_session(&self) -> Option<&str> {
        self.active_session.as_deref()
    }

    /// Rate limit for the manual "new session" trigger.
    pub fn allow_prompt_request(&mut self, now: Instant, debounce: Duration) -> bool {
        if let Some(last) = self.last_prompt_request {
            if now.saturating_duration_since(last) < debounce {
                return false;
            }
        }
        self.last_prompt_request = Some(now);
        true
    }
}
