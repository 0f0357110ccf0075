use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use lingo_core::models::ItemBody;
use lingo_core::remote::{HttpRemoteSource, MemoryRemoteSource, RemoteSource};
use lingo_core::{CacheItem, Collection, Library, SyncConfig, SyncProgress};
use serde::Serialize;

use crate::cli::GlobalArgs;
use crate::error::CliError;

/// Resolved global options shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub db_path: PathBuf,
    pub remote_url: Option<String>,
    pub remote_file: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
}

impl Context {
    pub fn from_args(args: GlobalArgs) -> Self {
        Self {
            db_path: resolve_db_path(args.db_path),
            remote_url: args.remote_url,
            remote_file: args.remote_file,
            config_path: args.config,
        }
    }

    pub fn sync_config(&self) -> Result<SyncConfig, CliError> {
        Ok(SyncConfig::load(self.config_path.as_deref())?)
    }

    /// The configured remote, `None` when neither a URL nor a dump is set.
    pub fn remote(&self) -> Result<Option<Arc<dyn RemoteSource>>, CliError> {
        if let Some(url) = self.remote_url.as_deref() {
            let source: Arc<dyn RemoteSource> = Arc::new(HttpRemoteSource::new(url)?);
            return Ok(Some(source));
        }
        if let Some(path) = self.remote_file.as_deref() {
            let source = MemoryRemoteSource::from_json_file(path).map_err(|error| {
                CliError::Config(format!("cannot load {}: {error}", path.display()))
            })?;
            let source: Arc<dyn RemoteSource> = Arc::new(source);
            return Ok(Some(source));
        }
        Ok(None)
    }

    /// Library that can reach the remote.
    pub fn open_library(&self) -> Result<Library, CliError> {
        let remote = self.remote()?.ok_or(CliError::RemoteNotConfigured)?;
        Ok(Library::open(&self.db_path, remote, self.sync_config()?)?)
    }

    /// Library for cache-only commands; it never starts a sync.
    pub fn open_local_library(&self) -> Result<Library, CliError> {
        let library = Library::open(
            &self.db_path,
            Arc::new(MemoryRemoteSource::new()),
            self.sync_config()?.without_background_sync(),
        )?;
        library.set_connectivity(false);
        Ok(library)
    }
}

#[derive(Debug, Serialize)]
pub struct ItemListItem {
    pub id: String,
    pub collection: Collection,
    pub title: String,
    pub detail: Option<String>,
    pub category: Option<String>,
    pub flagged: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
}

pub fn item_to_list_item(item: &CacheItem) -> ItemListItem {
    let now_ms = Utc::now().timestamp_millis();
    ItemListItem {
        id: item.id.clone(),
        collection: item.collection(),
        title: item.primary_text().to_string(),
        detail: item.secondary_text().map(str::to_string),
        category: item.category().map(str::to_string),
        flagged: item.local_flag,
        created_at: item.created_at,
        updated_at: item.updated_at,
        relative_time: format_relative_time(item.updated_at, now_ms),
    }
}

pub fn format_item_lines(items: &[CacheItem]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    items
        .iter()
        .map(|item| {
            let marker = if item.local_flag { '*' } else { ' ' };
            let id = preview(&item.id, 14);
            let title = preview(item.primary_text(), 28);
            let detail = preview(item.secondary_text().unwrap_or(""), 32);
            let relative_time = format_relative_time(item.updated_at, now_ms);
            format!("{marker} {id:<14}  {title:<28}  {detail:<32}  {relative_time}")
        })
        .collect()
}

/// Multi-line rendering for `show`.
pub fn format_item_detail(item: &CacheItem) -> Vec<String> {
    let mut lines = vec![format!("{} ({})", item.primary_text(), item.id)];

    match &item.body {
        ItemBody::Vocabulary(vocabulary) => {
            push_field(&mut lines, "Translation:", vocabulary.translation.as_deref());
            push_field(&mut lines, "Pronunciation:", vocabulary.pronunciation.as_deref());
            push_field(&mut lines, "Part of speech:", vocabulary.part_of_speech.as_deref());
            push_field(&mut lines, "Level:", vocabulary.level.as_deref());
            push_field(&mut lines, "Favorite:", Some(yes_no(item.local_flag)));
            for example in &vocabulary.examples {
                lines.push(format!("  - {example}"));
            }
            if !vocabulary.synonyms.is_empty() {
                lines.push(format!("  Synonyms: {}", vocabulary.synonyms.join(", ")));
            }
        }
        ItemBody::Resource(resource) => {
            push_field(&mut lines, "Description:", resource.description.as_deref());
            push_field(&mut lines, "URL:", resource.url.as_deref());
            push_field(&mut lines, "Category:", resource.category.as_deref());
            push_field(&mut lines, "Bookmarked:", Some(yes_no(item.local_flag)));
            if !resource.tags.is_empty() {
                let tags: Vec<String> = resource.tags.iter().map(|tag| format!("#{tag}")).collect();
                lines.push(format!("  {}", tags.join(" ")));
            }
        }
    }

    lines.push(format!(
        "  Updated {}",
        format_sync_timestamp(item.updated_at)
    ));
    lines
}

fn push_field(lines: &mut Vec<String>, label: &str, value: Option<&str>) {
    if let Some(value) = value {
        lines.push(format!("  {label:<15} {value}"));
    }
}

const fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// One line per sync progress update, e.g. `vocabularies: chunk 2/3, 400/450 items, ~2s left`.
pub fn format_progress_line(progress: &SyncProgress) -> String {
    let mut line = format!("{}: chunk {}", progress.collection, progress.current_chunk);
    if let Some(total_chunks) = progress.total_chunks {
        line.push_str(&format!("/{total_chunks}"));
    }
    line.push_str(&format!(", {}", progress.synced_items));
    if let Some(total_items) = progress.total_items {
        line.push_str(&format!("/{total_items}"));
    }
    line.push_str(" items");
    if let Some(remaining_ms) = progress.estimated_ms_remaining.filter(|ms| *ms > 0) {
        line.push_str(&format!(", ~{}s left", remaining_ms.div_ceil(1000)));
    }
    line
}

/// Label for the local flag of a collection.
pub const fn flag_label(collection: Collection, value: bool) -> &'static str {
    match (collection, value) {
        (Collection::Vocabularies, true) => "Favorited",
        (Collection::Vocabularies, false) => "Unfavorited",
        (Collection::Resources, true) => "Bookmarked",
        (Collection::Resources, false) => "Removed bookmark from",
    }
}

pub fn normalize_item_id(id: &str) -> Result<String, CliError> {
    let id = id.trim();
    if id.is_empty() {
        Err(CliError::EmptyItemId)
    } else {
        Ok(id.to_string())
    }
}

pub fn preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("LINGO_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lingo")
        .join("lingo.db")
}
