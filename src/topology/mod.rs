mod loop_worker;
mod watcher;

pub use loop_worker::{poll_topology, topology_loop};
pub use watcher::{DesktopWatcher, SuppressHandle, TopologyEvent};
