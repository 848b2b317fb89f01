mod engine;
mod launcher;
mod plan;

pub use engine::{RestoreEngine, RestorePacing, RestoreSummary};
pub use launcher::{LaunchCommand, Launcher, ProcessLauncher};
pub use plan::{
    build_plan, categorize, friendly_app_name, restore_preview, title_folder_hint, AppCategory,
    RestorePlan,
};
