//! Sync orchestrator.
//!
//! Drives full and delta syncs from a [`RemoteSource`] into the [`CacheStore`],
//! guards against concurrent runs per collection, reports progress, and owns
//! the background timer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::progress::{notify, ProgressCallback, ProgressReporter, SubscriptionId};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::models::{
    Collection, CollectionState, PageCursor, PersistedSyncState, SyncMode, SyncProgress,
    SyncStatus,
};
use crate::remote::RemoteSource;
use crate::store::CacheStore;
use crate::util::unix_millis_now;

/// Per-run options for [`SyncOrchestrator::sync_collection`].
#[derive(Clone)]
pub struct SyncOptions {
    pub mode: SyncMode,
    /// Called with every progress update of this run, in addition to subscribers
    pub on_progress: Option<ProgressCallback>,
}

impl SyncOptions {
    pub const fn full() -> Self {
        Self {
            mode: SyncMode::Full,
            on_progress: None,
        }
    }

    pub const fn delta() -> Self {
        Self {
            mode: SyncMode::Delta,
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }
}

/// How one collection run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Completed(usize),
    /// Another run of the collection was already in flight
    Skipped,
    /// `cancel_all` ran mid-run; holds the items written before it did
    Cancelled(usize),
}

impl RunOutcome {
    const fn items(self) -> usize {
        match self {
            Self::Completed(count) | Self::Cancelled(count) => count,
            Self::Skipped => 0,
        }
    }
}

impl std::fmt::Debug for SyncOptions {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncOptions")
            .field("mode", &self.mode)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Cloneable handle; clones share one orchestrator.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: CacheStore,
    remote: Arc<dyn RemoteSource>,
    config: SyncConfig,
    reporter: ProgressReporter,
    initialized: OnceCell<()>,
    online: AtomicBool,
    foreground: AtomicBool,
    next_run_id: AtomicU64,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// Collections with a run in flight, keyed to that run's id
    active: HashMap<Collection, u64>,
    progress: HashMap<Collection, SyncProgress>,
    persisted: PersistedSyncState,
    next_scheduled_sync: Option<i64>,
    timer: Option<JoinHandle<()>>,
    /// Bumped by every `cancel_all`
    cancel_epoch: u64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }
}

impl SyncOrchestrator {
    /// Create an orchestrator. Starts online and foregrounded.
    pub fn new(store: CacheStore, remote: Arc<dyn RemoteSource>, config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                remote,
                config,
                reporter: ProgressReporter::new(),
                initialized: OnceCell::new(),
                online: AtomicBool::new(true),
                foreground: AtomicBool::new(true),
                next_run_id: AtomicU64::new(1),
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.inner.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Load persisted state; resumes the background timer when the initial
    /// sync already completed in an earlier run. Only the first call does work.
    pub async fn initialize(&self) -> Result<()> {
        self.inner
            .initialized
            .get_or_try_init(|| async {
                let persisted = self.inner.store.load_sync_state().await?;
                let resume = persisted.initial_sync_done;
                self.state().persisted = persisted;
                tracing::debug!("Sync state loaded (initial sync done: {resume})");
                if resume {
                    self.start_timer();
                }
                Ok::<(), Error>(())
            })
            .await?;
        Ok(())
    }

    /// Full sync of every collection in priority order.
    ///
    /// Fails with [`Error::Offline`] before touching the remote when offline.
    /// Returns the number of items fetched.
    ///
    /// The initial sync is only marked done, and the timer only started, when
    /// every collection ran to completion. A `cancel_all` during the call stops
    /// it before the next collection.
    pub async fn start_full_sync(&self, on_progress: Option<ProgressCallback>) -> Result<usize> {
        self.initialize().await?;
        if !self.is_online() {
            return Err(Error::Offline);
        }

        tracing::info!("Starting full sync");
        let epoch = self.cancel_epoch();
        let mut total = 0;
        let mut complete = true;
        for collection in Collection::ALL {
            if self.cancel_epoch() != epoch {
                complete = false;
                break;
            }
            let options = SyncOptions {
                mode: SyncMode::Full,
                on_progress: on_progress.clone(),
            };
            let outcome = self.run_collection(collection, options).await?;
            total += outcome.items();
            match outcome {
                RunOutcome::Completed(_) => {}
                RunOutcome::Skipped => complete = false,
                RunOutcome::Cancelled(_) => {
                    complete = false;
                    break;
                }
            }
        }

        if !complete || self.cancel_epoch() != epoch {
            tracing::info!("Full sync incomplete after {total} items");
            return Ok(total);
        }

        self.inner.store.mark_initial_sync_done().await?;
        self.state().persisted.initial_sync_done = true;
        if self.cancel_epoch() == epoch {
            self.start_timer();
        }
        tracing::info!("Full sync finished: {total} items");
        Ok(total)
    }

    /// Delta sync of every collection, concurrently.
    ///
    /// A no-op returning `0` while offline or before the first full sync.
    pub async fn start_delta_sync(&self) -> Result<usize> {
        self.initialize().await?;
        if !self.is_online() || !self.initial_sync_done() {
            tracing::debug!("Skipping delta sync");
            return Ok(0);
        }

        let [first, second] = Collection::ALL;
        let (first, second) = tokio::join!(
            self.sync_collection(first, SyncOptions::delta()),
            self.sync_collection(second, SyncOptions::delta()),
        );
        let total = first? + second?;
        if total > 0 {
            tracing::info!("Delta sync applied {total} changes");
        }
        Ok(total)
    }

    /// Sync one collection. Returns `0` without doing anything when the
    /// collection is already syncing.
    pub async fn sync_collection(&self, collection: Collection, options: SyncOptions) -> Result<usize> {
        self.run_collection(collection, options)
            .await
            .map(RunOutcome::items)
    }

    async fn run_collection(&self, collection: Collection, options: SyncOptions) -> Result<RunOutcome> {
        let Some(run_id) = self.begin_run(collection) else {
            tracing::debug!("{collection} is already syncing");
            return Ok(RunOutcome::Skipped);
        };
        let callback = options.on_progress.as_ref();

        let mut progress = SyncProgress::new(collection, options.mode);
        self.publish(run_id, &progress, callback);

        let result = match options.mode {
            SyncMode::Full => self.run_full(collection, run_id, &mut progress, callback).await,
            SyncMode::Delta => self.run_delta(collection, run_id, &mut progress, callback).await,
        };
        let result = match result {
            Ok(count) if self.is_current(collection, run_id) => self
                .record_success(collection)
                .await
                .map(|()| RunOutcome::Completed(count)),
            Ok(count) => Ok(RunOutcome::Cancelled(count)),
            Err(error) => Err(error),
        };

        match &result {
            Ok(_) => progress.finish(),
            Err(error) => {
                tracing::warn!("{collection} {:?} sync failed: {error}", options.mode);
                progress.fail(error);
            }
        }
        self.publish(run_id, &progress, callback);
        self.end_run(collection, run_id);
        result
    }

    pub fn get_status(&self) -> SyncStatus {
        let state = self.state();
        SyncStatus {
            is_syncing: !state.active.is_empty(),
            last_sync_time: state.persisted.latest_sync(),
            is_offline: !self.is_online(),
            next_scheduled_sync: state.next_scheduled_sync,
        }
    }

    /// Live progress of a collection, or the last run's final progress.
    pub fn get_progress(&self, collection: Collection) -> Option<SyncProgress> {
        self.state().progress.get(&collection).cloned()
    }

    pub fn collection_state(&self, collection: Collection) -> CollectionState {
        let state = self.state();
        if state.active.contains_key(&collection) {
            CollectionState::Syncing
        } else {
            CollectionState::Idle {
                last_error: state
                    .progress
                    .get(&collection)
                    .and_then(|progress| progress.error.clone()),
            }
        }
    }

    /// Forget in-flight runs and stop the timer.
    ///
    /// Advisory: a fetch already in flight still writes its page, but paging
    /// stops afterwards.
    pub fn cancel_all(&self) {
        let mut state = self.state();
        state.active.clear();
        state.progress.clear();
        state.next_scheduled_sync = None;
        state.cancel_epoch += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        tracing::info!("Sync cancelled");
    }

    /// Connectivity hook. Coming back online triggers a background sync.
    pub fn set_connectivity(&self, online: bool) -> Option<JoinHandle<()>> {
        let was_online = self.inner.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            tracing::info!("Connectivity restored");
            return self.request_background_sync();
        }
        None
    }

    /// Lifecycle hook. Returning to the foreground triggers a background sync.
    pub fn set_foreground(&self, foreground: bool) -> Option<JoinHandle<()>> {
        let was_foreground = self.inner.foreground.swap(foreground, Ordering::SeqCst);
        if foreground && !was_foreground {
            return self.request_background_sync();
        }
        None
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    pub fn is_foreground(&self) -> bool {
        self.inner.foreground.load(Ordering::SeqCst)
    }

    /// Spawn a detached sync: full when the initial sync is missing or a
    /// collection is empty, delta otherwise. Errors are logged and dropped.
    ///
    /// Returns `None` outside a tokio runtime.
    pub fn request_background_sync(&self) -> Option<JoinHandle<()>> {
        let Ok(handle) = Handle::try_current() else {
            tracing::debug!("No runtime, background sync skipped");
            return None;
        };
        let orchestrator = self.clone();
        Some(handle.spawn(async move {
            if let Err(error) = orchestrator.background_sync().await {
                tracing::warn!("Background sync failed: {error}");
            }
        }))
    }

    pub fn subscribe_progress(&self, collection: Collection, callback: ProgressCallback) -> SubscriptionId {
        self.inner.reporter.subscribe(collection, callback)
    }

    pub fn unsubscribe_progress(&self, id: SubscriptionId) -> bool {
        self.inner.reporter.unsubscribe(id)
    }

    pub fn unsubscribe_all(&self, collection: Collection) {
        self.inner.reporter.unsubscribe_all(collection);
    }

    async fn background_sync(&self) -> Result<usize> {
        self.initialize().await?;
        if !self.is_online() {
            return Ok(0);
        }
        if !self.initial_sync_done() || self.any_collection_empty().await? {
            self.start_full_sync(None).await
        } else {
            self.start_delta_sync().await
        }
    }

    async fn any_collection_empty(&self) -> Result<bool> {
        for collection in Collection::ALL {
            if self.inner.store.is_empty(collection).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Page through the collection, newest first.
    async fn run_full(
        &self,
        collection: Collection,
        run_id: u64,
        progress: &mut SyncProgress,
        callback: Option<&ProgressCallback>,
    ) -> Result<usize> {
        let remote = &self.inner.remote;
        let chunk_size = self.inner.config.chunk_size;
        let started = Instant::now();

        match remote.count(collection).await {
            Ok(Some(total)) => {
                progress.set_total(total, chunk_size);
                self.publish(run_id, progress, callback);
            }
            Ok(None) => {}
            Err(error) => tracing::warn!("Could not count {collection}: {error}"),
        }

        let mut cursor: Option<PageCursor> = None;
        let mut synced = 0;
        loop {
            let page = match remote.query_page(collection, chunk_size, cursor.as_ref()).await {
                Ok(page) => page,
                Err(error) if error.is_query_unsupported() && cursor.is_none() => {
                    tracing::warn!("{error}; fetching {collection} unordered");
                    let items = remote.query_all(collection).await?;
                    let fetched = items.len();
                    if progress.total_items.is_none() {
                        progress.set_total(fetched, fetched);
                    }
                    self.inner.store.upsert_items(collection, items).await?;
                    progress.record_chunk(fetched, started.elapsed());
                    self.publish(run_id, progress, callback);
                    return Ok(fetched);
                }
                Err(error) => return Err(error),
            };

            let fetched = page.len();
            if fetched == 0 {
                break;
            }
            cursor = page.last().map(PageCursor::from);
            self.inner.store.upsert_items(collection, page).await?;
            synced += fetched;
            progress.record_chunk(fetched, started.elapsed());
            self.publish(run_id, progress, callback);
            tracing::debug!(
                "{collection} chunk {}: {synced} items",
                progress.current_chunk
            );

            // Pages can come back short once malformed records are dropped,
            // so only an empty page or the known total ends paging
            if progress.total_items.is_some_and(|total| synced >= total) {
                break;
            }
            if !self.is_current(collection, run_id) {
                tracing::debug!("{collection} full sync cancelled after {synced} items");
                break;
            }
            if !self.inner.config.chunk_delay.is_zero() {
                tokio::time::sleep(self.inner.config.chunk_delay).await;
            }
        }
        Ok(synced)
    }

    /// Fetch everything updated after the local watermark.
    async fn run_delta(
        &self,
        collection: Collection,
        run_id: u64,
        progress: &mut SyncProgress,
        callback: Option<&ProgressCallback>,
    ) -> Result<usize> {
        let Some(watermark) = self.inner.store.max_update_timestamp(collection).await? else {
            return Ok(0);
        };
        let started = Instant::now();
        let items = self.inner.remote.query_since(collection, watermark).await?;
        if items.is_empty() {
            return Ok(0);
        }

        let changed = items.len();
        progress.set_total(changed, changed);
        self.inner.store.upsert_items(collection, items).await?;
        progress.record_chunk(changed, started.elapsed());
        self.publish(run_id, progress, callback);
        tracing::debug!("{collection} delta: {changed} changes since {watermark}");
        Ok(changed)
    }

    async fn record_success(&self, collection: Collection) -> Result<()> {
        let now = unix_millis_now();
        self.inner.store.record_last_sync(collection, now).await?;
        self.state().persisted.last_sync.insert(collection, now);
        Ok(())
    }

    fn start_timer(&self) {
        let Some(period) = self.inner.config.background_interval else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!("No runtime, background timer not started");
            return;
        };

        let weak = Arc::downgrade(&self.inner);
        let timer = handle.spawn(run_timer(weak, period));

        let mut state = self.state();
        if let Some(previous) = state.timer.replace(timer) {
            previous.abort();
        }
        state.next_scheduled_sync = Some(next_tick_at(period));
        tracing::debug!("Background sync every {}s", period.as_secs());
    }

    fn begin_run(&self, collection: Collection) -> Option<u64> {
        let mut state = self.state();
        if state.active.contains_key(&collection) {
            return None;
        }
        let run_id = self.inner.next_run_id.fetch_add(1, Ordering::Relaxed);
        state.active.insert(collection, run_id);
        Some(run_id)
    }

    fn end_run(&self, collection: Collection, run_id: u64) {
        let mut state = self.state();
        if state.active.get(&collection) == Some(&run_id) {
            state.active.remove(&collection);
        }
    }

    fn is_current(&self, collection: Collection, run_id: u64) -> bool {
        self.state().active.get(&collection) == Some(&run_id)
    }

    fn cancel_epoch(&self) -> u64 {
        self.state().cancel_epoch
    }

    fn initial_sync_done(&self) -> bool {
        self.state().persisted.initial_sync_done
    }

    /// Record and fan out a progress update of a still-current run.
    fn publish(&self, run_id: u64, progress: &SyncProgress, callback: Option<&ProgressCallback>) {
        let collection = progress.collection;
        {
            let mut state = self.state();
            if state.active.get(&collection) != Some(&run_id) {
                return;
            }
            state.progress.insert(collection, progress.clone());
        }
        if let Some(callback) = callback {
            notify(callback, collection, progress);
        }
        self.inner.reporter.emit(collection, progress);
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_timer(inner: Weak<Inner>, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let orchestrator = SyncOrchestrator { inner };
        orchestrator.state().next_scheduled_sync = Some(next_tick_at(period));

        if !orchestrator.is_foreground() || !orchestrator.is_online() {
            continue;
        }
        if let Err(error) = orchestrator.start_delta_sync().await {
            tracing::warn!("Scheduled sync failed: {error}");
        }
    }
}

fn next_tick_at(period: Duration) -> i64 {
    let period_ms = i64::try_from(period.as_millis()).unwrap_or(i64::MAX);
    unix_millis_now().saturating_add(period_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CacheItem, ItemBody, Resource, Vocabulary};
    use crate::remote::MemoryRemoteSource;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    /// Remote wrapper that records every call.
    #[derive(Default)]
    struct CountingRemote {
        inner: MemoryRemoteSource,
        calls: Mutex<Vec<(&'static str, Collection)>>,
        hide_count: bool,
        ordered_unsupported: bool,
        /// Only the cursor-less first page supports ordering
        unsupported_after_first_page: bool,
        /// Dropped from pages the way the adapters drop malformed records
        malformed_id: Option<&'static str>,
        fail_pages: bool,
        page_delay: Option<Duration>,
    }

    impl CountingRemote {
        fn record(&self, kind: &'static str, collection: Collection) {
            self.calls.lock().unwrap().push((kind, collection));
        }

        fn calls_of(&self, kind: &str, collection: Collection) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, c)| *k == kind && *c == collection)
                .count()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RemoteSource for CountingRemote {
        async fn query_page(
            &self,
            collection: Collection,
            limit: usize,
            cursor: Option<&PageCursor>,
        ) -> Result<Vec<CacheItem>> {
            self.record("page", collection);
            if let Some(delay) = self.page_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_pages {
                return Err(Error::Remote("connection reset (503)".to_string()));
            }
            if self.ordered_unsupported || (self.unsupported_after_first_page && cursor.is_some()) {
                return Err(Error::QueryUnsupported("index required (412)".to_string()));
            }
            let mut page = self.inner.query_page(collection, limit, cursor).await?;
            if let Some(malformed) = self.malformed_id {
                page.retain(|item| item.id != malformed);
            }
            Ok(page)
        }

        async fn query_all(&self, collection: Collection) -> Result<Vec<CacheItem>> {
            self.record("all", collection);
            self.inner.query_all(collection).await
        }

        async fn query_since(
            &self,
            collection: Collection,
            updated_after: i64,
        ) -> Result<Vec<CacheItem>> {
            self.record("since", collection);
            self.inner.query_since(collection, updated_after).await
        }

        async fn count(&self, collection: Collection) -> Result<Option<usize>> {
            self.record("count", collection);
            if self.hide_count {
                return Ok(None);
            }
            self.inner.count(collection).await
        }
    }

    fn vocab(i: i64) -> CacheItem {
        CacheItem::vocabulary(format!("v{i:04}"), i, 1_000 + i, Vocabulary::new(format!("mot {i}")))
    }

    fn seed_vocab(remote: &CountingRemote, count: i64) {
        for i in 0..count {
            remote.inner.insert(vocab(i)).unwrap();
        }
    }

    fn test_config() -> SyncConfig {
        SyncConfig::default()
            .with_chunk_size(200)
            .with_chunk_delay(Duration::ZERO)
            .without_background_sync()
    }

    fn orchestrator_with(remote: CountingRemote, config: SyncConfig) -> (SyncOrchestrator, Arc<CountingRemote>) {
        let remote = Arc::new(remote);
        let store = CacheStore::open_in_memory().unwrap();
        let orchestrator = SyncOrchestrator::new(store, Arc::clone(&remote) as Arc<dyn RemoteSource>, config);
        (orchestrator, remote)
    }

    fn recorder(collection: Collection) -> (Arc<Mutex<Vec<SyncProgress>>>, ProgressCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |progress: &SyncProgress| {
            if progress.collection == collection {
                sink.lock().unwrap().push(progress.clone());
            }
        });
        (seen, callback)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_full_sync_pages_through_collection() {
        let remote = CountingRemote::default();
        seed_vocab(&remote, 450);
        let (orchestrator, remote) = orchestrator_with(remote, test_config());
        let (seen, callback) = recorder(Collection::Vocabularies);

        let synced = orchestrator.start_full_sync(Some(callback)).await.unwrap();
        assert_eq!(synced, 450);
        assert_eq!(remote.calls_of("page", Collection::Vocabularies), 3);

        let chunks: Vec<usize> = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|progress| progress.current_chunk > 0 && !progress.is_complete)
            .map(|progress| progress.synced_items)
            .collect();
        assert_eq!(chunks, vec![200, 400, 450]);

        let last = orchestrator.get_progress(Collection::Vocabularies).unwrap();
        assert!(last.is_complete);
        assert_eq!(last.error, None);
        assert_eq!(last.total_chunks, Some(3));

        let store = orchestrator.store();
        assert_eq!(
            store.max_update_timestamp(Collection::Vocabularies).await.unwrap(),
            Some(1_449)
        );
        let status = orchestrator.get_status();
        assert!(!status.is_syncing);
        assert!(status.last_sync_time.is_some());
        assert!(store.load_sync_state().await.unwrap().initial_sync_done);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_full_sync_stops_at_reported_total() {
        let remote = CountingRemote::default();
        seed_vocab(&remote, 400);
        let (orchestrator, remote) = orchestrator_with(remote, test_config());

        orchestrator.start_full_sync(None).await.unwrap();
        assert_eq!(remote.calls_of("page", Collection::Vocabularies), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_full_sync_without_total_reads_until_empty_page() {
        let remote = CountingRemote {
            hide_count: true,
            ..CountingRemote::default()
        };
        seed_vocab(&remote, 400);
        let (orchestrator, remote) = orchestrator_with(remote, test_config());

        orchestrator.start_full_sync(None).await.unwrap();
        assert_eq!(remote.calls_of("page", Collection::Vocabularies), 3);
        assert_eq!(
            orchestrator
                .store()
                .metadata(Collection::Vocabularies)
                .await
                .unwrap()
                .unwrap()
                .item_count,
            400
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_full_sync_continues_past_page_shortened_by_malformed_record() {
        let remote = CountingRemote {
            malformed_id: Some("v0400"),
            ..CountingRemote::default()
        };
        seed_vocab(&remote, 450);
        let (orchestrator, remote) = orchestrator_with(remote, test_config());

        assert_eq!(orchestrator.start_full_sync(None).await.unwrap(), 449);
        // 199, 200, 50, then an empty page
        assert_eq!(remote.calls_of("page", Collection::Vocabularies), 4);

        let store = orchestrator.store();
        let cached = store
            .metadata(Collection::Vocabularies)
            .await
            .unwrap()
            .unwrap()
            .item_count;
        assert_eq!(cached, 449);
        assert!(store
            .get_by_id(Collection::Vocabularies, "v0000")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get_by_id(Collection::Vocabularies, "v0400")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_full_sync_offline_makes_no_remote_calls() {
        let remote = CountingRemote::default();
        seed_vocab(&remote, 10);
        let (orchestrator, remote) = orchestrator_with(remote, test_config());

        assert!(orchestrator.set_connectivity(false).is_none());
        let error = orchestrator.start_full_sync(None).await.unwrap_err();
        assert!(matches!(error, Error::Offline));
        assert_eq!(remote.total_calls(), 0);
        assert!(orchestrator.get_status().is_offline);

        assert_eq!(orchestrator.start_delta_sync().await.unwrap(), 0);
        assert_eq!(remote.total_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delta_sync_requires_initial_sync() {
        let remote = CountingRemote::default();
        seed_vocab(&remote, 10);
        let (orchestrator, remote) = orchestrator_with(remote, test_config());

        assert_eq!(orchestrator.start_delta_sync().await.unwrap(), 0);
        assert_eq!(remote.total_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delta_sync_skips_empty_cache() {
        let (orchestrator, remote) = orchestrator_with(CountingRemote::default(), test_config());
        orchestrator.start_full_sync(None).await.unwrap();

        assert_eq!(orchestrator.start_delta_sync().await.unwrap(), 0);
        assert_eq!(remote.calls_of("since", Collection::Vocabularies), 0);
        assert_eq!(remote.calls_of("since", Collection::Resources), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delta_sync_fetches_newer_items() {
        let remote = CountingRemote::default();
        seed_vocab(&remote, 5);
        let (orchestrator, remote) = orchestrator_with(remote, test_config());
        orchestrator.start_full_sync(None).await.unwrap();

        for i in 0..3 {
            let item = CacheItem::vocabulary(format!("new{i}"), 2_000 + i, 2_000 + i, Vocabulary::new("neuf"));
            remote.inner.insert(item).unwrap();
        }

        assert_eq!(orchestrator.start_delta_sync().await.unwrap(), 3);
        assert_eq!(remote.calls_of("since", Collection::Vocabularies), 1);
        let store = orchestrator.store();
        assert_eq!(
            store.max_update_timestamp(Collection::Vocabularies).await.unwrap(),
            Some(2_002)
        );
        assert!(store
            .get_by_id(Collection::Vocabularies, "new1")
            .await
            .unwrap()
            .is_some());
        assert_eq!(
            orchestrator
                .get_progress(Collection::Vocabularies)
                .unwrap()
                .mode,
            SyncMode::Delta
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_no_concurrent_sync_per_collection() {
        let remote = CountingRemote {
            page_delay: Some(Duration::from_millis(50)),
            ..CountingRemote::default()
        };
        seed_vocab(&remote, 10);
        let (orchestrator, remote) = orchestrator_with(remote, test_config());

        let (first, second) = tokio::join!(
            orchestrator.sync_collection(Collection::Vocabularies, SyncOptions::full()),
            orchestrator.sync_collection(Collection::Vocabularies, SyncOptions::full()),
        );
        let mut results = vec![first.unwrap(), second.unwrap()];
        results.sort_unstable();
        assert_eq!(results, vec![0, 10]);
        assert_eq!(remote.calls_of("page", Collection::Vocabularies), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unsupported_ordering_falls_back_to_single_page() {
        let remote = CountingRemote {
            ordered_unsupported: true,
            ..CountingRemote::default()
        };
        seed_vocab(&remote, 450);
        remote
            .inner
            .insert(CacheItem::resource("r1", 1, 1, Resource::new("Podcast")))
            .unwrap();
        let (orchestrator, remote) = orchestrator_with(remote, test_config());

        assert_eq!(orchestrator.start_full_sync(None).await.unwrap(), 451);
        assert_eq!(remote.calls_of("page", Collection::Vocabularies), 1);
        assert_eq!(remote.calls_of("all", Collection::Vocabularies), 1);
        assert_eq!(remote.calls_of("all", Collection::Resources), 1);
        assert!(!orchestrator
            .store()
            .is_empty(Collection::Resources)
            .await
            .unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unsupported_ordering_after_first_page_fails() {
        let remote = CountingRemote {
            unsupported_after_first_page: true,
            ..CountingRemote::default()
        };
        seed_vocab(&remote, 450);
        let (orchestrator, remote) = orchestrator_with(remote, test_config());

        let error = orchestrator.start_full_sync(None).await.unwrap_err();
        assert!(error.is_query_unsupported());
        assert_eq!(remote.calls_of("page", Collection::Vocabularies), 2);
        assert_eq!(remote.calls_of("all", Collection::Vocabularies), 0);
        assert_eq!(remote.calls_of("page", Collection::Resources), 0);

        let progress = orchestrator.get_progress(Collection::Vocabularies).unwrap();
        assert!(progress.is_complete);
        assert!(progress.error.unwrap().contains("index required"));

        let store = orchestrator.store();
        assert_eq!(
            store
                .metadata(Collection::Vocabularies)
                .await
                .unwrap()
                .unwrap()
                .item_count,
            200
        );
        assert!(!store.load_sync_state().await.unwrap().initial_sync_done);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_failure_is_captured_in_progress() {
        let remote = CountingRemote {
            fail_pages: true,
            ..CountingRemote::default()
        };
        seed_vocab(&remote, 3);
        let (orchestrator, _remote) = orchestrator_with(remote, test_config());

        let error = orchestrator.start_full_sync(None).await.unwrap_err();
        assert!(matches!(error, Error::Remote(_)));

        let progress = orchestrator.get_progress(Collection::Vocabularies).unwrap();
        assert!(progress.is_complete);
        assert!(progress.error.unwrap().contains("connection reset"));
        assert!(matches!(
            orchestrator.collection_state(Collection::Vocabularies),
            CollectionState::Idle { last_error: Some(_) }
        ));
        assert!(!orchestrator.get_status().is_syncing);
        assert!(!orchestrator
            .store()
            .load_sync_state()
            .await
            .unwrap()
            .initial_sync_done);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_local_flag_survives_later_sync() {
        let remote = CountingRemote::default();
        seed_vocab(&remote, 3);
        let (orchestrator, remote) = orchestrator_with(remote, test_config());
        orchestrator.start_full_sync(None).await.unwrap();

        let store = orchestrator.store().clone();
        let flag = {
            let store = store.clone();
            tokio::spawn(async move { store.set_local_flag(Collection::Vocabularies, "v0001", true).await })
        };
        let mut changed = Vocabulary::new("mot modifié");
        changed.translation = Some("changed word".to_string());
        remote
            .inner
            .insert(CacheItem::vocabulary("v0001", 1, 5_000, changed))
            .unwrap();
        orchestrator.start_delta_sync().await.unwrap();
        flag.await.unwrap().unwrap();

        let item = store
            .get_by_id(Collection::Vocabularies, "v0001")
            .await
            .unwrap()
            .unwrap();
        assert!(item.local_flag);
        let ItemBody::Vocabulary(body) = item.body else {
            panic!("expected vocabulary body");
        };
        assert_eq!(body.translation.as_deref(), Some("changed word"));

        // The flag bump must not move the delta watermark
        assert_eq!(
            store.max_update_timestamp(Collection::Vocabularies).await.unwrap(),
            Some(5_000)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panicking_subscriber_does_not_break_sync() {
        let remote = CountingRemote::default();
        seed_vocab(&remote, 5);
        let (orchestrator, _remote) = orchestrator_with(remote, test_config());

        orchestrator.subscribe_progress(Collection::Vocabularies, Arc::new(|_| panic!("boom")));
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        orchestrator.subscribe_progress(
            Collection::Vocabularies,
            Arc::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(orchestrator.start_full_sync(None).await.unwrap(), 5);
        // start, total, one chunk, finish
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_all_stops_paging() {
        let remote = CountingRemote::default();
        seed_vocab(&remote, 10);
        let (orchestrator, remote) =
            orchestrator_with(remote, test_config().with_chunk_size(2));

        let handle = orchestrator.clone();
        let callback: ProgressCallback = Arc::new(move |progress: &SyncProgress| {
            if progress.synced_items >= 2 {
                handle.cancel_all();
            }
        });
        let synced = orchestrator
            .sync_collection(
                Collection::Vocabularies,
                SyncOptions::full().with_progress(callback),
            )
            .await
            .unwrap();

        assert_eq!(synced, 2);
        assert_eq!(remote.calls_of("page", Collection::Vocabularies), 1);
        assert!(orchestrator.get_progress(Collection::Vocabularies).is_none());
        assert!(orchestrator
            .store()
            .load_sync_state()
            .await
            .unwrap()
            .last_sync
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelled_full_sync_is_not_recorded_as_done() {
        let remote = CountingRemote::default();
        seed_vocab(&remote, 10);
        let config = test_config()
            .with_chunk_size(2)
            .with_background_interval(Duration::from_secs(60));
        let (orchestrator, remote) = orchestrator_with(remote, config);

        let handle = orchestrator.clone();
        let callback: ProgressCallback = Arc::new(move |progress: &SyncProgress| {
            if progress.synced_items >= 2 {
                handle.cancel_all();
            }
        });

        assert_eq!(orchestrator.start_full_sync(Some(callback)).await.unwrap(), 2);
        assert_eq!(remote.calls_of("page", Collection::Vocabularies), 1);
        assert_eq!(remote.calls_of("count", Collection::Resources), 0);
        assert_eq!(orchestrator.get_status().next_scheduled_sync, None);

        let state = orchestrator.store().load_sync_state().await.unwrap();
        assert!(!state.initial_sync_done);
        assert!(state.last_sync.is_empty());

        // The partial cache is not mistaken for a baseline
        assert_eq!(orchestrator.start_delta_sync().await.unwrap(), 0);
        assert_eq!(remote.calls_of("since", Collection::Vocabularies), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_full_sync_skipping_busy_collection_stays_pending() {
        let remote = CountingRemote {
            page_delay: Some(Duration::from_millis(50)),
            ..CountingRemote::default()
        };
        seed_vocab(&remote, 10);
        remote
            .inner
            .insert(CacheItem::resource("r1", 1, 1, Resource::new("Podcast")))
            .unwrap();
        let config = test_config().with_background_interval(Duration::from_secs(60));
        let (orchestrator, remote) = orchestrator_with(remote, config);

        let (single, full) = tokio::join!(
            orchestrator.sync_collection(Collection::Vocabularies, SyncOptions::full()),
            orchestrator.start_full_sync(None),
        );
        assert_eq!(single.unwrap(), 10);
        // Only resources ran as part of the full sync
        assert_eq!(full.unwrap(), 1);
        assert_eq!(remote.calls_of("page", Collection::Vocabularies), 1);

        assert!(!orchestrator
            .store()
            .load_sync_state()
            .await
            .unwrap()
            .initial_sync_done);
        assert_eq!(orchestrator.get_status().next_scheduled_sync, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_background_sync_runs_full_sync_first() {
        let remote = CountingRemote::default();
        seed_vocab(&remote, 5);
        let (orchestrator, remote) = orchestrator_with(remote, test_config());

        orchestrator.request_background_sync().unwrap().await.unwrap();
        assert_eq!(remote.calls_of("page", Collection::Vocabularies), 1);
        assert!(orchestrator.get_status().last_sync_time.is_some());

        // Resources is still empty, so the next trigger is a full sync again
        orchestrator.request_background_sync().unwrap().await.unwrap();
        assert_eq!(remote.calls_of("page", Collection::Vocabularies), 2);
        assert_eq!(remote.calls_of("since", Collection::Vocabularies), 0);

        remote
            .inner
            .insert(CacheItem::resource("r1", 1, 1, Resource::new("Podcast")))
            .unwrap();
        orchestrator.request_background_sync().unwrap().await.unwrap();
        orchestrator.request_background_sync().unwrap().await.unwrap();
        assert_eq!(remote.calls_of("since", Collection::Vocabularies), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reconnect_triggers_sync() {
        let remote = CountingRemote::default();
        seed_vocab(&remote, 5);
        let (orchestrator, remote) = orchestrator_with(remote, test_config());

        assert!(orchestrator.set_connectivity(false).is_none());
        assert!(orchestrator.request_background_sync().unwrap().await.is_ok());
        assert_eq!(remote.total_calls(), 0);

        orchestrator.set_connectivity(true).unwrap().await.unwrap();
        assert_eq!(remote.calls_of("page", Collection::Vocabularies), 1);
        assert!(orchestrator.set_connectivity(true).is_none());

        assert!(orchestrator.set_foreground(false).is_none());
        assert!(orchestrator.set_foreground(true).is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_initialize_resumes_timer() {
        let store = CacheStore::open_in_memory().unwrap();
        store.mark_initial_sync_done().await.unwrap();
        let orchestrator = SyncOrchestrator::new(
            store,
            Arc::new(MemoryRemoteSource::new()),
            test_config().with_background_interval(Duration::from_secs(60)),
        );

        assert_eq!(orchestrator.get_status().next_scheduled_sync, None);
        orchestrator.initialize().await.unwrap();
        orchestrator.initialize().await.unwrap();
        assert!(orchestrator.get_status().next_scheduled_sync.is_some());

        orchestrator.cancel_all();
        assert_eq!(orchestrator.get_status().next_scheduled_sync, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timer_runs_delta_sync() {
        let remote = CountingRemote::default();
        seed_vocab(&remote, 2);
        remote
            .inner
            .insert(CacheItem::resource("r1", 1, 1, Resource::new("Podcast")))
            .unwrap();
        let config = test_config().with_background_interval(Duration::from_millis(40));
        let (orchestrator, remote) = orchestrator_with(remote, config);
        orchestrator.start_full_sync(None).await.unwrap();

        remote.inner.insert(vocab(50)).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(remote.calls_of("since", Collection::Vocabularies) >= 1);
        assert!(orchestrator
            .store()
            .get_by_id(Collection::Vocabularies, "v0050")
            .await
            .unwrap()
            .is_some());
    }
}
