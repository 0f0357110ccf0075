//! Progress subscriptions keyed by collection.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::models::{Collection, SyncProgress};

/// Callback invoked with every progress update of a collection.
pub type ProgressCallback = Arc<dyn Fn(&SyncProgress) + Send + Sync>;

/// Handle returned by [`ProgressReporter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    collection: Collection,
    callback: ProgressCallback,
}

/// Fan-out of progress updates to registered callbacks.
///
/// Callbacks run synchronously on the emitting task, outside the registry
/// lock, so a callback may itself subscribe or unsubscribe.
#[derive(Default)]
pub struct ProgressReporter {
    next_id: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ProgressReporter")
            .field("subscriptions", &self.len())
            .finish()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, collection: Collection, callback: ProgressCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscription {
            id,
            collection,
            callback,
        });
        id
    }

    /// Remove one subscription; `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.lock();
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        subscriptions.len() != before
    }

    pub fn unsubscribe_all(&self, collection: Collection) {
        self.lock()
            .retain(|subscription| subscription.collection != collection);
    }

    /// Deliver `progress` to every subscriber of `collection`.
    ///
    /// A panicking callback is logged and skipped; the rest still run.
    pub fn emit(&self, collection: Collection, progress: &SyncProgress) {
        let callbacks: Vec<ProgressCallback> = self
            .lock()
            .iter()
            .filter(|subscription| subscription.collection == collection)
            .map(|subscription| Arc::clone(&subscription.callback))
            .collect();

        for callback in &callbacks {
            notify(callback, collection, progress);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        // Callbacks never run under the lock, so a poisoned registry is still consistent
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run one callback, logging instead of unwinding if it panics.
pub(crate) fn notify(callback: &ProgressCallback, collection: Collection, progress: &SyncProgress) {
    if catch_unwind(AssertUnwindSafe(|| callback(progress))).is_err() {
        tracing::warn!("Progress callback for {collection} panicked");
    }
}
