use std::path::PathBuf;

use lingo_core::{Collection, Library};
use serde::Serialize;

use crate::commands::common::{format_relative_time, format_sync_timestamp, Context};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub db_path: PathBuf,
    pub remote: Option<String>,
    pub initial_sync_done: bool,
    pub last_sync_time: Option<i64>,
    pub collections: Vec<CollectionReport>,
}

#[derive(Debug, Serialize)]
pub struct CollectionReport {
    pub collection: Collection,
    pub item_count: usize,
    pub last_sync: Option<i64>,
    pub is_stale: bool,
}

pub async fn run_status(context: &Context, as_json: bool) -> Result<(), CliError> {
    let library = context.open_local_library()?;
    let report = build_status_report(context, &library).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_status_lines(&report, chrono::Utc::now().timestamp_millis()) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn build_status_report(
    context: &Context,
    library: &Library,
) -> Result<StatusReport, CliError> {
    let store = library.store();
    let persisted = store.load_sync_state().await?;

    let mut collections = Vec::with_capacity(Collection::ALL.len());
    for collection in Collection::ALL {
        let metadata = store.metadata(collection).await?;
        collections.push(CollectionReport {
            collection,
            item_count: metadata.as_ref().map_or(0, |metadata| metadata.item_count),
            last_sync: persisted.last_sync.get(&collection).copied(),
            is_stale: store.is_stale(collection).await?,
        });
    }

    let remote = context
        .remote_url
        .clone()
        .or_else(|| context.remote_file.as_ref().map(|path| path.display().to_string()));

    Ok(StatusReport {
        db_path: context.db_path.clone(),
        remote,
        initial_sync_done: persisted.initial_sync_done,
        last_sync_time: persisted.latest_sync(),
        collections,
    })
}

pub fn format_status_lines(report: &StatusReport, now_ms: i64) -> Vec<String> {
    let mut lines = vec![
        format!("Cache:  {}", report.db_path.display()),
        format!(
            "Remote: {}",
            report.remote.as_deref().unwrap_or("not configured")
        ),
    ];

    match report.last_sync_time {
        Some(at) => lines.push(format!(
            "Last sync: {} ({})",
            format_sync_timestamp(at),
            format_relative_time(at, now_ms)
        )),
        None if report.initial_sync_done => lines.push("Last sync: unknown".to_string()),
        None => lines.push("Last sync: never (run `lingo sync`)".to_string()),
    }

    for collection in &report.collections {
        let freshness = if collection.is_stale { "stale" } else { "fresh" };
        lines.push(format!(
            "  {:<13} {:>6} items  {freshness}",
            collection.collection.as_str(),
            collection.item_count
        ));
    }
    lines
}
