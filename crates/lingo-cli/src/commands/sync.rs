use std::sync::Arc;

use lingo_core::sync::SubscriptionId;
use lingo_core::{Collection, Library, SyncProgress};

use crate::commands::common::{format_progress_line, Context};
use crate::error::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRequest {
    /// Full sync until the first one completed, delta afterwards
    Auto,
    Full,
    Delta,
}

impl SyncRequest {
    pub const fn from_flags(full: bool, delta: bool) -> Self {
        match (full, delta) {
            (true, _) => Self::Full,
            (false, true) => Self::Delta,
            (false, false) => Self::Auto,
        }
    }
}

pub async fn run_sync(context: &Context, request: SyncRequest) -> Result<(), CliError> {
    let library = context.open_library()?;
    let subscriptions = print_progress(&library);
    let result = sync_library(&library, request).await;
    for id in subscriptions {
        library.unsubscribe_progress(id);
    }

    match result? {
        SyncOutcome::Synced(0) => println!("Cache is up to date"),
        SyncOutcome::Synced(count) => println!("Synced {count} items"),
        SyncOutcome::NeedsFullSync => {
            println!("No full sync has completed yet; run `lingo sync --full` first.");
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced(usize),
    NeedsFullSync,
}

pub async fn sync_library(library: &Library, request: SyncRequest) -> Result<SyncOutcome, CliError> {
    library.initialize().await?;
    let initial_sync_done = library.store().load_sync_state().await?.initial_sync_done;
    let orchestrator = library.orchestrator();

    let count = match (request, initial_sync_done) {
        (SyncRequest::Full, _) | (SyncRequest::Auto, false) => {
            orchestrator.start_full_sync(None).await?
        }
        (SyncRequest::Delta | SyncRequest::Auto, true) => orchestrator.start_delta_sync().await?,
        (SyncRequest::Delta, false) => return Ok(SyncOutcome::NeedsFullSync),
    };
    Ok(SyncOutcome::Synced(count))
}

/// Print a line for every processed chunk of every collection.
pub fn print_progress(library: &Library) -> Vec<SubscriptionId> {
    Collection::ALL
        .into_iter()
        .map(|collection| {
            library.subscribe_progress(
                collection,
                Arc::new(|progress: &SyncProgress| {
                    if progress.current_chunk > 0 && !progress.is_complete {
                        println!("{}", format_progress_line(progress));
                    } else if let Some(error) = progress.error.as_deref() {
                        eprintln!("{} failed: {error}", progress.collection);
                    }
                }),
            )
        })
        .collect()
}
