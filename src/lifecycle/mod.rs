mod manager;
mod reconcile;
mod salvage;
mod state;

pub use manager::{SessionManager, PROMPT_DEBOUNCE};
pub use reconcile::ReconcileReport;
pub use salvage::salvage_windows;
pub use state::TrackerState;
