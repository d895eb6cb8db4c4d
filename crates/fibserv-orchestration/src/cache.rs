//! Unlimited result cache: one shared task per (algorithm, n) key.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::task::{Task, TaskKey, TaskState};

/// Map from key to the shared in-flight-or-completed task.
///
/// Unlimited in size and lifetime: completed and failed tasks are kept
/// forever, so repeated requests observe the cached outcome without
/// recomputation. There is no eviction and no TTL. A task that ended
/// `Cancelled` is replaced on the next request for its key, so a past
/// disconnect never poisons the key.
#[derive(Default)]
pub struct ResultCache {
    entries: Mutex<HashMap<TaskKey, Arc<Task>>>,
}

impl ResultCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically fetch the task for `key`, creating it when absent.
    ///
    /// Exactly one caller per key observes `created = true` and must
    /// wire the execution; every concurrent caller for the same unseen
    /// key observes that winner's task instead.
    pub fn get_or_create(&self, key: TaskKey) -> (Arc<Task>, bool) {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&key) {
            if !matches!(existing.state(), TaskState::Cancelled) {
                return (Arc::clone(existing), false);
            }
            debug!(task = %key, "replacing cancelled cache entry");
        }
        let task = Task::new(key);
        entries.insert(key, Arc::clone(&task));
        (task, true)
    }

    /// Look a key up without creating anything.
    #[must_use]
    pub fn get(&self, key: TaskKey) -> Option<Arc<Task>> {
        self.entries.lock().get(&key).cloned()
    }

    /// Number of cached tasks, live and terminal.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Empty the map, returning every cached task. Shutdown path.
    pub fn drain(&self) -> Vec<Arc<Task>> {
        self.entries.lock().drain().map(|(_, task)| task).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fibserv_core::Algorithm;
    use num_bigint::BigUint;

    fn key(n: u64) -> TaskKey {
        TaskKey {
            algorithm: Algorithm::Iterative,
            n,
        }
    }

    #[test]
    fn second_lookup_shares_the_task() {
        let cache = ResultCache::new();
        let (first, created_first) = cache.get_or_create(key(10));
        let (second, created_second) = cache.get_or_create(key(10));
        assert!(created_first);
        assert!(!created_second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_keys_get_distinct_tasks() {
        let cache = ResultCache::new();
        let (a, _) = cache.get_or_create(key(10));
        let (b, _) = cache.get_or_create(key(11));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn completed_entries_are_kept() {
        let cache = ResultCache::new();
        let (task, _) = cache.get_or_create(key(10));
        task.finish(Ok(BigUint::from(55u32)));

        let (again, created) = cache.get_or_create(key(10));
        assert!(!created);
        assert!(Arc::ptr_eq(&task, &again));
    }

    #[test]
    fn cancelled_entries_are_replaced() {
        let cache = ResultCache::new();
        let (task, _) = cache.get_or_create(key(10));
        task.cancel();

        let (fresh, created) = cache.get_or_create(key(10));
        assert!(created);
        assert!(!Arc::ptr_eq(&task, &fresh));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn drain_empties_the_cache() {
        let cache = ResultCache::new();
        cache.get_or_create(key(1));
        cache.get_or_create(key(2));
        let drained = cache.drain();
        assert_eq!(drained.len(), 2);
        assert!(cache.is_empty());
    }
}
