use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use lingo_core::Collection;

#[derive(Parser)]
#[command(name = "lingo")]
#[command(about = "Offline-first vocabulary and resource cache")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Optional path to the local cache database
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Base URL of the remote collection API
    #[arg(long, global = true, value_name = "URL", env = "LINGO_REMOTE_URL")]
    pub remote_url: Option<String>,

    /// JSON dump used as the remote instead of the API
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "LINGO_REMOTE_FILE",
        conflicts_with = "remote_url"
    )]
    pub remote_file: Option<PathBuf>,

    /// Sync tuning file (JSON)
    #[arg(long, global = true, value_name = "PATH", env = "LINGO_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pull remote changes into the local cache
    Sync {
        /// Re-fetch every collection page by page
        #[arg(long, conflicts_with = "delta")]
        full: bool,
        /// Only fetch items updated since the last sync
        #[arg(long)]
        delta: bool,
    },
    /// List cached items
    #[command(alias = "ls")]
    List {
        #[arg(value_parser = parse_collection)]
        collection: Collection,
        /// Zero-based page number
        #[arg(long, default_value = "0")]
        page: usize,
        /// Items per page
        #[arg(long, default_value = "20")]
        page_size: usize,
        /// Case-insensitive text search
        #[arg(short, long)]
        search: Option<String>,
        /// Exact category (part of speech or resource type)
        #[arg(long)]
        category: Option<String>,
        /// Only favorites (vocabularies) or bookmarks (resources)
        #[arg(long)]
        flagged: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one cached item
    Show {
        #[arg(value_parser = parse_collection)]
        collection: Collection,
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Favorite a vocabulary entry or bookmark a resource
    Flag {
        #[arg(value_parser = parse_collection)]
        collection: Collection,
        id: String,
        /// Clear the flag instead of setting it
        #[arg(long)]
        off: bool,
    },
    /// Show cache and sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep the cache fresh in the foreground until interrupted
    Watch,
}

pub fn parse_collection(value: &str) -> Result<Collection, String> {
    value.parse().map_err(|error: lingo_core::Error| error.to_string())
}
