pub mod commands;
pub mod controller;
pub mod lock;
pub mod timers;

pub use commands::{dispatch, handle_line, CommandReply, DaemonCommand};
pub use controller::DaemonController;
pub use lock::{running_daemon, DaemonLock, PID_FILE_NAME};
pub use timers::{snapshot_loop, time_loop};
