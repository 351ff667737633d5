//! Per-key cache of server-owned collections with optimistic mutations.
//!
//! A mutation runs as a [`Transaction`]:
//!
//! 1. [`OptimisticCache::begin`] aborts any refetch in flight for the key,
//!    snapshots the cached value and applies the speculative change
//! 2. the caller renders [`Transaction::value`] and sends the request
//! 3. [`Transaction::commit`] marks the key stale so the next read (or a
//!    [`OptimisticCache::refetch_in_background`]) replaces the guess with
//!    server data; [`Transaction::rollback`] restores the snapshot exactly,
//!    unless another write to the key landed since `begin`
//!
//! Dropping an unfinished transaction rolls it back.
//!
//! Every write bumps a per-key epoch. Fetch results are only stored if the
//! epoch is unchanged since the fetch started, so a refetch that raced with
//! a mutation can never overwrite it. A transaction remembers the epoch it
//! set; once a later write has moved past it, its snapshot is out of date,
//! so rolling back marks the key stale instead of restoring.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::AbortHandle;

struct Entry<V> {
    value: Option<V>,
    stale: bool,
    epoch: u64,
    refetch: Option<AbortHandle>,
}

impl<V> Default for Entry<V> {
    fn default() -> Self {
        Self {
            value: None,
            stale: true,
            epoch: 0,
            refetch: None,
        }
    }
}

impl<V> Entry<V> {
    /// Abort the refetch in flight, if any, and invalidate its result.
    fn supersede(&mut self) {
        if let Some(refetch) = self.refetch.take() {
            refetch.abort();
        }
        self.epoch += 1;
    }
}

/// Optimistic cache keyed by `K` holding values of `V`.
///
/// Cheaply cloneable; clones share entries.
pub struct OptimisticCache<K, V> {
    entries: Arc<Mutex<HashMap<K, Entry<V>>>>,
}

impl<K, V> Clone for OptimisticCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K, V> Default for OptimisticCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> OptimisticCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The cached value, stale or not.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).and_then(|entry| entry.value.clone())
    }

    /// Whether `key` needs fetching (missing or marked stale).
    #[must_use]
    pub fn is_stale(&self, key: &K) -> bool {
        self.lock().get(key).is_none_or(|entry| entry.stale)
    }

    /// Store server data for `key`, superseding any fetch in flight.
    pub fn set(&self, key: K, value: V) {
        let mut entries = self.lock();
        let entry = entries.entry(key).or_default();
        entry.supersede();
        entry.value = Some(value);
        entry.stale = false;
    }

    /// Mark `key` stale; the value stays readable until replaced.
    pub fn invalidate(&self, key: &K) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.stale = true;
        }
    }

    /// Drop `key` entirely, aborting any refetch in flight.
    pub fn remove(&self, key: &K) {
        if let Some(mut entry) = self.lock().remove(key) {
            entry.supersede();
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        for (_, mut entry) in self.lock().drain() {
            entry.supersede();
        }
    }

    /// Store `value` if no write happened since `epoch`. Returns whether it
    /// was stored.
    fn store_if_current(&self, key: &K, epoch: u64, value: V) -> bool {
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.epoch == epoch => {
                entry.value = Some(value);
                entry.stale = false;
                entry.refetch = None;
                true
            }
            _ => false,
        }
    }

    /// Current epoch of `key`, creating the entry if needed.
    fn epoch(&self, key: &K) -> u64 {
        self.lock().entry(key.clone()).or_default().epoch
    }

    /// Read `key`, fetching it when missing or stale.
    ///
    /// If a mutation lands while `fetch` is outstanding, the fetched value is
    /// discarded and the (speculative) cached value is returned instead.
    ///
    /// # Errors
    ///
    /// Returns the fetch error. Nothing is cached on failure.
    pub async fn load<E, F>(&self, key: &K, fetch: F) -> Result<V, E>
    where
        F: Future<Output = Result<V, E>>,
    {
        if !self.is_stale(key)
            && let Some(value) = self.get(key)
        {
            return Ok(value);
        }

        let epoch = self.epoch(key);
        let value = fetch.await?;
        if self.store_if_current(key, epoch, value.clone()) {
            Ok(value)
        } else {
            tracing::debug!("Fetched value superseded by a newer write");
            Ok(self.get(key).unwrap_or(value))
        }
    }

    /// Refetch `key` on a background task.
    ///
    /// Replaces any refetch already in flight for `key`. The task is aborted
    /// when a mutation begins on `key`.
    pub fn refetch_in_background<E, F>(&self, key: K, fetch: F)
    where
        E: std::fmt::Display + Send + 'static,
        F: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut entries = self.lock();
        let entry = entries.entry(key.clone()).or_default();
        entry.supersede();
        let epoch = entry.epoch;

        let cache = self.clone();
        let task = tokio::spawn(async move {
            match fetch.await {
                Ok(value) => {
                    if !cache.store_if_current(&key, epoch, value) {
                        tracing::debug!("Background refetch superseded");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Background refetch failed"),
            }
        });
        entry.refetch = Some(task.abort_handle());
    }

    /// Begin a speculative mutation of `key`.
    ///
    /// `apply` runs against a copy of the cached value and returns whether it
    /// changed anything. Returns `None`, touching nothing (an in-flight
    /// refetch keeps running), when `key` has no cached value or `apply`
    /// reports no change.
    pub fn begin<F>(&self, key: K, apply: F) -> Option<Transaction<K, V>>
    where
        F: FnOnce(&mut V) -> bool,
    {
        let mut entries = self.lock();
        let entry = entries.get_mut(&key)?;
        let mut next = entry.value.clone()?;
        if !apply(&mut next) {
            return None;
        }

        entry.supersede();
        let snapshot = Snapshot {
            value: entry.value.replace(next.clone()),
            stale: entry.stale,
            epoch: entry.epoch,
        };
        drop(entries);

        Some(Transaction {
            cache: self.clone(),
            key,
            value: next,
            snapshot: Some(snapshot),
        })
    }

    /// Undo a transaction. Returns whether the snapshot was restored.
    ///
    /// When another write moved the epoch on, the snapshot no longer
    /// describes the server state. The key is marked stale and a refetch in
    /// flight keeps running.
    fn restore(&self, key: &K, snapshot: Snapshot<V>) -> bool {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        if entry.epoch != snapshot.epoch {
            entry.stale = true;
            return false;
        }
        entry.supersede();
        entry.value = snapshot.value;
        entry.stale = snapshot.stale;
        true
    }
}

struct Snapshot<V> {
    value: Option<V>,
    stale: bool,
    /// Epoch set by `begin`.
    epoch: u64,
}

/// An in-progress optimistic mutation.
#[must_use = "dropping a Transaction rolls it back"]
pub struct Transaction<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache: OptimisticCache<K, V>,
    key: K,
    value: V,
    snapshot: Option<Snapshot<V>>,
}

impl<K, V> Transaction<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// The speculative value.
    pub const fn value(&self) -> &V {
        &self.value
    }

    /// The key being mutated.
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// The server accepted the mutation. The key is marked stale.
    pub fn commit(mut self) {
        self.snapshot = None;
        self.cache.invalidate(&self.key);
    }

    /// The server rejected the mutation.
    ///
    /// Restores the pre-mutation value and returns `true`. Returns `false`
    /// when a later write to the key superseded this transaction: the key is
    /// left stale and the caller should refetch it.
    pub fn rollback(mut self) -> bool {
        self.restore()
    }

    fn restore(&mut self) -> bool {
        self.snapshot
            .take()
            .is_some_and(|snapshot| self.cache.restore(&self.key, snapshot))
    }
}

impl<K, V> Drop for Transaction<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    type Cache = OptimisticCache<&'static str, Vec<u32>>;

    fn cache_with(value: Vec<u32>) -> Cache {
        let cache = Cache::new();
        cache.set("k", value);
        cache
    }

    fn bump_first(values: &mut Vec<u32>) -> bool {
        match values.first_mut() {
            Some(first) => {
                *first += 1;
                true
            }
            None => false,
        }
    }

    #[test]
    fn test_begin_applies_immediately() {
        let cache = cache_with(vec![2]);
        let tx = cache.begin("k", bump_first).unwrap();
        assert_eq!(tx.value(), &vec![3]);
        assert_eq!(cache.get(&"k"), Some(vec![3]));
        tx.commit();
        assert_eq!(cache.get(&"k"), Some(vec![3]));
        assert!(cache.is_stale(&"k"));
    }

    #[test]
    fn test_rollback_restores_exactly() {
        let cache = cache_with(vec![2, 7]);
        cache.invalidate(&"k");

        let tx = cache.begin("k", bump_first).unwrap();
        assert!(tx.rollback());

        assert_eq!(cache.get(&"k"), Some(vec![2, 7]));
        assert!(cache.is_stale(&"k"));
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let cache = cache_with(vec![2]);
        {
            let _tx = cache.begin("k", bump_first).unwrap();
            assert_eq!(cache.get(&"k"), Some(vec![3]));
        }
        assert_eq!(cache.get(&"k"), Some(vec![2]));
        assert!(!cache.is_stale(&"k"));
    }

    #[test]
    fn test_noop_mutation_does_not_begin() {
        let cache = cache_with(Vec::new());
        assert!(cache.begin("k", bump_first).is_none());
        assert!(cache.begin("missing", bump_first).is_none());
        assert_eq!(cache.get(&"k"), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_load_fetches_when_stale_only() {
        let cache = Cache::new();
        let value = cache.load(&"k", async { Ok::<_, ()>(vec![1]) }).await;
        assert_eq!(value, Ok(vec![1]));

        // Fresh: the fetch is not awaited.
        let value = cache
            .load(&"k", async { Err::<Vec<u32>, _>("should not run") })
            .await;
        assert_eq!(value, Ok(vec![1]));

        cache.invalidate(&"k");
        let value = cache.load(&"k", async { Ok::<_, ()>(vec![5]) }).await;
        assert_eq!(value, Ok(vec![5]));
    }

    #[tokio::test]
    async fn test_failed_load_caches_nothing() {
        let cache = Cache::new();
        let value = cache.load(&"k", async { Err::<Vec<u32>, _>("down") }).await;
        assert_eq!(value, Err("down"));
        assert_eq!(cache.get(&"k"), None);
    }

    #[tokio::test]
    async fn test_mutation_aborts_in_flight_refetch() {
        let cache = cache_with(vec![2]);
        let finished = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&finished);
        cache.refetch_in_background("k", async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, String>(vec![100])
        });

        let tx = cache.begin("k", bump_first).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(cache.get(&"k"), Some(vec![3]));
        tx.commit();
    }

    #[tokio::test]
    async fn test_refetch_replaces_speculative_value() {
        let cache = cache_with(vec![2]);
        cache.begin("k", bump_first).unwrap().commit();

        cache.refetch_in_background("k", async { Ok::<_, String>(vec![4]) });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.get(&"k"), Some(vec![4]));
        assert!(!cache.is_stale(&"k"));
    }

    #[tokio::test]
    async fn test_load_superseded_by_mutation_keeps_mutation() {
        let cache = cache_with(vec![2]);
        cache.invalidate(&"k");

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let loader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .load(&"k", async move {
                        wait.await.unwrap();
                        Ok::<_, ()>(vec![2])
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let tx = cache.begin("k", bump_first).unwrap();
        release.send(()).unwrap();
        let loaded = loader.await.unwrap();

        assert_eq!(loaded, Ok(vec![3]));
        assert_eq!(cache.get(&"k"), Some(vec![3]));
        tx.commit();
    }

    #[tokio::test]
    async fn test_rollback_after_later_commit_keeps_reconciling() {
        let cache = cache_with(vec![2]);
        let first = cache.begin("k", bump_first).unwrap();
        let second = cache.begin("k", bump_first).unwrap();
        assert_eq!(cache.get(&"k"), Some(vec![4]));

        second.commit();
        cache.refetch_in_background("k", async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, String>(vec![4])
        });

        assert!(!first.rollback());
        assert!(cache.is_stale(&"k"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.get(&"k"), Some(vec![4]));
        assert!(!cache.is_stale(&"k"));
    }

    #[test]
    fn test_superseded_rollback_marks_stale() {
        let cache = cache_with(vec![2]);
        let first = cache.begin("k", bump_first).unwrap();
        cache.set("k", vec![9]);

        assert!(!first.rollback());
        assert_eq!(cache.get(&"k"), Some(vec![9]));
        assert!(cache.is_stale(&"k"));
    }

    #[test]
    fn test_rollback_after_remove_does_not_resurrect() {
        let cache = cache_with(vec![2]);
        let tx = cache.begin("k", bump_first).unwrap();
        cache.remove(&"k");

        assert!(!tx.rollback());
        assert_eq!(cache.get(&"k"), None);
    }
}
