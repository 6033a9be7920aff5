mod display_loop;
mod snapshot;

pub use display_loop::{worker_settings, DisplayLoop, LoopState};
pub use snapshot::SnapshotRenderer;
