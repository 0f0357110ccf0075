//! Sync bookkeeping models

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::collection::Collection;
use crate::util::unix_millis_now;

/// Per-collection cache metadata, written with every upsert batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub collection: Collection,
    /// Last time a batch was written (Unix ms)
    pub last_full_sync: i64,
    /// Number of cached items after that batch
    pub item_count: usize,
}

impl SyncMetadata {
    /// Whether the cache is older than `window` at time `now` (Unix ms).
    #[must_use]
    pub fn is_stale_at(&self, now: i64, window: Duration) -> bool {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        now.saturating_sub(self.last_full_sync) > window_ms
    }
}

/// Which sync strategy a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Chunked, paginated fetch of the whole collection
    Full,
    /// Fetch of items updated after the local watermark
    Delta,
}

/// Live progress of one collection's sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub collection: Collection,
    pub mode: SyncMode,
    /// Remote collection size, when the remote reports it
    pub total_items: Option<usize>,
    pub synced_items: usize,
    /// Number of chunks processed so far
    pub current_chunk: usize,
    pub total_chunks: Option<usize>,
    pub is_complete: bool,
    /// Last error of this run, kept until the next run starts
    pub error: Option<String>,
    /// Run start (Unix ms)
    pub started_at: i64,
    pub estimated_ms_remaining: Option<u64>,
}

impl SyncProgress {
    #[must_use]
    pub fn new(collection: Collection, mode: SyncMode) -> Self {
        Self {
            collection,
            mode,
            total_items: None,
            synced_items: 0,
            current_chunk: 0,
            total_chunks: None,
            is_complete: false,
            error: None,
            started_at: unix_millis_now(),
            estimated_ms_remaining: None,
        }
    }

    /// Record the expected collection size and derive the chunk count.
    pub fn set_total(&mut self, total_items: usize, chunk_size: usize) {
        self.total_items = Some(total_items);
        self.total_chunks = Some(total_items.div_ceil(chunk_size.max(1)));
    }

    /// Account for one processed chunk and re-estimate the remaining time.
    pub fn record_chunk(&mut self, items: usize, elapsed: Duration) {
        self.synced_items += items;
        self.current_chunk += 1;
        self.estimated_ms_remaining = self
            .total_items
            .and_then(|total| estimate_remaining(total, self.synced_items, elapsed));
    }

    /// Mark the run as finished successfully.
    pub fn finish(&mut self) {
        self.is_complete = true;
        self.estimated_ms_remaining = Some(0);
    }

    /// Mark the run as finished with an error.
    pub fn fail(&mut self, error: impl ToString) {
        self.is_complete = true;
        self.error = Some(error.to_string());
        self.estimated_ms_remaining = None;
    }

    /// Completed fraction in `0.0..=1.0`, when the total is known.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> Option<f64> {
        match self.total_items {
            Some(0) => Some(1.0),
            Some(total) => Some((self.synced_items as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Linear extrapolation: `remaining / (synced / elapsed)`, in milliseconds.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn estimate_remaining(total: usize, synced: usize, elapsed: Duration) -> Option<u64> {
    let elapsed_secs = elapsed.as_secs_f64();
    if synced == 0 || elapsed_secs <= 0.0 {
        return None;
    }
    let remaining = total.saturating_sub(synced) as f64;
    let rate = synced as f64 / elapsed_secs;
    Some((remaining / rate * 1000.0).round() as u64)
}

/// Orchestrator-level state of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CollectionState {
    Idle { last_error: Option<String> },
    Syncing,
}

/// Snapshot returned by `get_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    /// Most recent successful sync across collections (Unix ms)
    pub last_sync_time: Option<i64>,
    pub is_offline: bool,
    /// Next background tick (Unix ms), when the timer is running
    pub next_scheduled_sync: Option<i64>,
}

/// Orchestrator state that survives process restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSyncState {
    pub initial_sync_done: bool,
    pub last_sync: BTreeMap<Collection, i64>,
}

impl PersistedSyncState {
    /// Most recent last-sync time over all collections.
    #[must_use]
    pub fn latest_sync(&self) -> Option<i64> {
        self.last_sync.values().copied().max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_progress_tracks_chunks_and_eta() {
        let mut progress = SyncProgress::new(Collection::Vocabularies, SyncMode::Full);
        progress.set_total(450, 200);
        assert_eq!(progress.total_chunks, Some(3));

        progress.record_chunk(200, Duration::from_secs(2));
        assert_eq!(progress.synced_items, 200);
        assert_eq!(progress.current_chunk, 1);
        // 250 remaining at 100 items/s
        assert_eq!(progress.estimated_ms_remaining, Some(2500));

        progress.record_chunk(200, Duration::from_secs(4));
        progress.record_chunk(50, Duration::from_secs(5));
        assert_eq!(progress.synced_items, 450);
        assert_eq!(progress.estimated_ms_remaining, Some(0));
        assert_eq!(progress.fraction(), Some(1.0));

        progress.finish();
        assert!(progress.is_complete);
        assert_eq!(progress.error, None);
    }

    #[test]
    fn test_progress_without_total_has_no_eta() {
        let mut progress = SyncProgress::new(Collection::Resources, SyncMode::Full);
        progress.record_chunk(10, Duration::from_secs(1));
        assert_eq!(progress.estimated_ms_remaining, None);
        assert_eq!(progress.fraction(), None);
    }

    #[test]
    fn test_progress_fail_keeps_error() {
        let mut progress = SyncProgress::new(Collection::Resources, SyncMode::Delta);
        progress.fail("network down");
        assert!(progress.is_complete);
        assert_eq!(progress.error.as_deref(), Some("network down"));
    }

    #[test]
    fn test_metadata_staleness() {
        let metadata = SyncMetadata {
            collection: Collection::Vocabularies,
            last_full_sync: 1_000,
            item_count: 3,
        };
        let window = Duration::from_secs(60);
        assert!(!metadata.is_stale_at(61_000, window));
        assert!(metadata.is_stale_at(61_001, window));
    }

    #[test]
    fn test_latest_sync() {
        let mut state = PersistedSyncState::default();
        assert_eq!(state.latest_sync(), None);
        state.last_sync.insert(Collection::Vocabularies, 10);
        state.last_sync.insert(Collection::Resources, 20);
        assert_eq!(state.latest_sync(), Some(20));
    }
}
