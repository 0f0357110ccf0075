//! Sync orchestration between the remote source and the local cache.

mod orchestrator;
mod progress;

pub use orchestrator::{SyncOptions, SyncOrchestrator};
pub use progress::{ProgressCallback, ProgressReporter, SubscriptionId};
