use crate::commands::common::Context;
use crate::commands::sync::{print_progress, sync_library, SyncOutcome, SyncRequest};
use crate::error::CliError;

pub async fn run_watch(context: &Context) -> Result<(), CliError> {
    let library = context.open_library()?;
    let Some(interval) = library.orchestrator().config().background_interval else {
        return Err(CliError::Config(
            "background sync is disabled; set LINGO_SYNC_INTERVAL_SECS above 0".to_string(),
        ));
    };

    print_progress(&library);
    if let SyncOutcome::Synced(count) = sync_library(&library, SyncRequest::Auto).await? {
        println!("Synced {count} items");
    }

    println!(
        "Watching for changes every {}s. Press Ctrl-C to stop.",
        interval.as_secs()
    );
    tokio::signal::ctrl_c().await?;
    library.orchestrator().cancel_all();
    println!("Stopped.");
    Ok(())
}
