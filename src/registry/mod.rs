//! Process-wide in-flight registry shared between the scheduler and the
//! worker pool (`spec.md` §3). Ephemeral by design: losing it on restart
//! is safe because the server's job status is the source of truth.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

/// Tracks job ids that are enqueued or currently executing in this
/// process, and hands out a per-job mutual-exclusion lock so at most one
/// worker executes a given job id at a time.
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    in_flight: Arc<Mutex<HashSet<String>>>,
    job_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `id` is already enqueued or executing.
    pub async fn contains(&self, id: &str) -> bool {
        self.in_flight.lock().await.contains(id)
    }

    /// Adds `id` to the in-flight set. Returns `true` if it was newly
    /// inserted (i.e. it was not already present).
    pub async fn insert(&self, id: &str) -> bool {
        self.in_flight.lock().await.insert(id.to_string())
    }

    /// Removes `id` from the in-flight set. Safe to call even if `id` was
    /// never present.
    pub async fn remove(&self, id: &str) {
        self.in_flight.lock().await.remove(id);
    }

    /// Current number of ids tracked as in-flight (used by invariant tests).
    pub async fn len(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Returns the per-job lock for `id`, creating it if absent. The
    /// returned handle can be cloned and locked by the caller; the entry
    /// in the map is retained so repeat lookups for the same id share the
    /// same underlying mutex (this is what makes the lock exclusive
    /// *across* worker iterations, not just within one).
    pub async fn job_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.job_locks.lock().await;
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the map entry for `id` if nothing else currently holds a
    /// clone of its lock. Called after a worker releases the lock, so the
    /// map doesn't grow unboundedly over the life of the process.
    pub async fn forget_lock_if_unused(&self, id: &str) {
        let mut locks = self.job_locks.lock().await;
        if let Some(lock) = locks.get(id) {
            // strong_count == 1 means only this map entry still references it.
            if Arc::strong_count(lock) == 1 {
                locks.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_reports_whether_newly_added() {
        let registry = InFlightRegistry::new();
        assert!(registry.insert("j1").await);
        assert!(!registry.insert("j1").await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = InFlightRegistry::new();
        registry.insert("j1").await;
        registry.remove("j1").await;
        registry.remove("j1").await;
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn job_lock_is_exclusive_across_lookups() {
        let registry = InFlightRegistry::new();
        let lock_a = registry.job_lock("j1").await;
        let lock_b = registry.job_lock("j1").await;

        let guard = lock_a.lock().await;
        // A second acquisition attempt on the same underlying mutex must not
        // succeed while the first guard is held.
        assert!(lock_b.try_lock().is_err());
        drop(guard);
        assert!(lock_b.try_lock().is_ok());
    }

    #[tokio::test]
    async fn forget_lock_prunes_unreferenced_entries() {
        let registry = InFlightRegistry::new();
        let lock = registry.job_lock("j1").await;
        drop(lock);
        registry.forget_lock_if_unused("j1").await;
        // A fresh lookup after pruning returns a distinct lock instance.
        let lock_again = registry.job_lock("j1").await;
        assert_eq!(Arc::strong_count(&lock_again), 1);
    }
}
