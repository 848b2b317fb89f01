mod sessions;
mod snapshots;
mod stats;
