//! Lingo CLI - inspect and sync the offline vocabulary cache
//!
//! Reads always come from the local cache; only `sync` and `watch` talk to
//! the remote.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::Context;
use crate::commands::flag::run_flag;
use crate::commands::list::{run_list, ListArgs};
use crate::commands::show::run_show;
use crate::commands::status::run_status;
use crate::commands::sync::{run_sync, SyncRequest};
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lingo=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let context = Context::from_args(cli.global);

    match cli.command {
        Commands::Sync { full, delta } => {
            run_sync(&context, SyncRequest::from_flags(full, delta)).await?;
        }
        Commands::List {
            collection,
            page,
            page_size,
            search,
            category,
            flagged,
            json,
        } => {
            let args = ListArgs {
                collection,
                page,
                page_size,
                search,
                category,
                flagged,
            };
            run_list(&context, args, json).await?;
        }
        Commands::Show {
            collection,
            id,
            json,
        } => run_show(&context, collection, &id, json).await?,
        Commands::Flag {
            collection,
            id,
            off,
        } => run_flag(&context, collection, &id, !off).await?,
        Commands::Status { json } => run_status(&context, json).await?,
        Commands::Watch => run_watch(&context).await?,
    }

    Ok(())
}
