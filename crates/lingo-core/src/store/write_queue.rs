//! FIFO serializer for store mutations

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

/// Runs mutations one at a time, in the order they were submitted.
///
/// Built on tokio's `Mutex`, which grants the lock in request order. A failed
/// mutation releases the gate like any other, so later writes still run.
#[derive(Debug, Default)]
pub struct WriteQueue {
    gate: Mutex<()>,
    pending: AtomicUsize,
}

struct PendingGuard<'a>(&'a AtomicUsize);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for every previously queued mutation, then run `op`.
    pub async fn run<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let _pending = PendingGuard(&self.pending);
        let _turn = self.gate.lock().await;
        op().await
    }

    /// Mutations queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}
