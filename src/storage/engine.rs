//! Concurrent TTL Map
//!
//! This module implements [`TtlStore`], the public handle over the three
//! coupled indices (key table, insertion sequence, expiry heap).
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: the key table, the insertion sequence and the expiry heap
//!    form a single unit of mutual exclusion. Every mutation, the key lookup
//!    and both sweeps serialize on one `Mutex`.
//! 2. **Tombstones**: deletes flag the entry and drop its key mapping; the
//!    sequence and heap slots are reclaimed later by the sweeper.
//! 3. **Snapshot Reads**: range and order queries hold the lock only long
//!    enough to clone the sequence of `Arc`s, then scan outside the lock.
//! 4. **Detached Sweeper**: the background task owns an `Arc<Shared>`, never
//!    the store, so dropping the store is always safe.
//!
//! ## Concurrency Model
//!
//! ```text
//!   callers ──┐                          ┌── ExpirySweeper (Tokio task)
//!             ▼                          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Arc<Shared<K, V>>                        │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │ Mutex<IndexState>   table │ sequence │ heap           │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │  counters (atomics, lock-free)                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Range and order reads see the structure as of their snapshot but judge
//! liveness when they scan it, so an entry tombstoned in between is left out
//! even though the snapshot still holds it.

use crate::error::{Result, StoreError};
use crate::storage::entry::{Entry, ExpirePolicy, PolicyHint, Timestamp};
use crate::storage::expiry::{ExpiryConfig, ExpirySweeper};
use crate::storage::index::{
    collect_by_order, collect_time_range, IndexSizes, IndexState, Lookup, SweepReport,
};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::info;

/// Operation counters, updated without taking the index lock.
#[derive(Debug, Default)]
struct Counters {
    inserts: AtomicU64,
    updates: AtomicU64,
    erased: AtomicU64,
    lazily_expired: AtomicU64,
    incremental_sweeps: AtomicU64,
    full_sweeps: AtomicU64,
    reclaimed: AtomicU64,
}

/// Store statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Successful inserts, including the re-insert half of each update
    pub inserts: u64,
    /// Successful updates
    pub updates: u64,
    /// Keys removed by the erase operations
    pub erased: u64,
    /// Key lookups that found a dead mapping and dropped it
    pub lazily_expired: u64,
    /// Incremental sweeps run
    pub incremental_sweeps: u64,
    /// Full sweeps run
    pub full_sweeps: u64,
    /// Index slots reclaimed by all sweeps
    pub reclaimed: u64,
}

/// The synchronized state shared by the store handle and the sweeper task.
pub(crate) struct Shared<K, V> {
    index: Mutex<IndexState<K, V>>,
    counters: Counters,
}

impl<K, V> Shared<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            index: Mutex::new(IndexState::new()),
            counters: Counters::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IndexState<K, V>> {
        self.index.lock().expect("index lock poisoned")
    }

    pub(crate) fn index_sizes(&self) -> IndexSizes {
        self.lock().sizes()
    }

    pub(crate) fn stats(&self) -> StoreStats {
        let c = &self.counters;
        StoreStats {
            inserts: c.inserts.load(Ordering::Relaxed),
            updates: c.updates.load(Ordering::Relaxed),
            erased: c.erased.load(Ordering::Relaxed),
            lazily_expired: c.lazily_expired.load(Ordering::Relaxed),
            incremental_sweeps: c.incremental_sweeps.load(Ordering::Relaxed),
            full_sweeps: c.full_sweeps.load(Ordering::Relaxed),
            reclaimed: c.reclaimed.load(Ordering::Relaxed),
        }
    }

    /// Empties all three indices. The entries are dropped after the lock is
    /// released. Runs from `Drop`, so a poisoned lock is not a reason to panic.
    pub(crate) fn clear(&self) {
        let drained = {
            let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
            index.take()
        };
        drop(drained);
    }
}

impl<K, V> Shared<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn insert(&self, key: K, value: V, policy: ExpirePolicy) -> bool {
        let mut index = self.lock();
        // Stamped under the lock so the sequence stays sorted
        let inserted = index.insert(key, value, policy, Instant::now());
        if inserted {
            self.counters.inserts.fetch_add(1, Ordering::Relaxed);
        }
        inserted
    }

    pub(crate) fn erase_by_key(&self, key: &K) -> bool {
        let erased = self.lock().erase_key(key);
        if erased {
            self.counters.erased.fetch_add(1, Ordering::Relaxed);
        }
        erased
    }

    pub(crate) fn erase_by_time_range(&self, start: Timestamp, end: Timestamp) -> usize {
        if start > end {
            return 0;
        }
        let erased = self.lock().erase_time_range(start, end);
        self.counters.erased.fetch_add(erased as u64, Ordering::Relaxed);
        erased
    }

    pub(crate) fn erase_by_order(&self, n: usize, ascending: bool) -> usize {
        let mut index = self.lock();
        let erased = index.erase_by_order(n, ascending, Instant::now());
        self.counters.erased.fetch_add(erased as u64, Ordering::Relaxed);
        erased
    }

    pub(crate) fn update_value(&self, key: K, value: V, hint: PolicyHint) -> bool {
        let mut index = self.lock();
        let updated = index.update(key, value, hint, Instant::now());
        if updated {
            self.counters.updates.fetch_add(1, Ordering::Relaxed);
            self.counters.inserts.fetch_add(1, Ordering::Relaxed);
        }
        updated
    }

    pub(crate) fn get_by_key(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let mut index = self.lock();
        match index.lookup(key, Instant::now()) {
            Lookup::Hit(value) => Some(value),
            Lookup::Missing => None,
            Lookup::Expired => {
                self.counters.lazily_expired.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub(crate) fn get_by_time_range(
        &self,
        start: Timestamp,
        end: Timestamp,
        ascending: bool,
    ) -> Vec<Entry<K, V>>
    where
        V: Clone,
    {
        if start > end {
            return Vec::new();
        }
        let snapshot = self.lock().snapshot();
        collect_time_range(&snapshot, start, end, ascending, Instant::now())
    }

    pub(crate) fn get_by_order(&self, n: usize, ascending: bool) -> Vec<Entry<K, V>>
    where
        V: Clone,
    {
        let snapshot = self.lock().snapshot();
        collect_by_order(&snapshot, n, ascending, Instant::now())
    }

    pub(crate) fn sweep_incremental(&self) -> SweepReport {
        let report = self.lock().sweep_incremental(Instant::now());
        self.counters.incremental_sweeps.fetch_add(1, Ordering::Relaxed);
        self.counters
            .reclaimed
            .fetch_add(report.total() as u64, Ordering::Relaxed);
        report
    }

    pub(crate) fn sweep_full(&self) -> SweepReport {
        let report = self.lock().sweep_full(Instant::now());
        self.counters.full_sweeps.fetch_add(1, Ordering::Relaxed);
        self.counters
            .reclaimed
            .fetch_add(report.total() as u64, Ordering::Relaxed);
        report
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        self.lock().assert_consistent();
    }
}

/// A concurrent in-memory map with per-entry TTL.
///
/// Besides lookup by key, entries can be queried and erased by insertion
/// order (oldest or newest first) and by insertion-time range. Expired
/// entries disappear from every query as soon as their deadline passes; the
/// memory is reclaimed by a background sweeper that the store starts on
/// construction and stops when it is dropped.
///
/// # Thread Safety
///
/// All operations take `&self` and are synchronous. Wrap the store in an
/// `Arc` to share it across threads or tasks.
///
/// # Panics
///
/// The constructors spawn the sweeper onto the current Tokio runtime and
/// panic if there is none.
///
/// # Example
///
/// ```
/// use tidekv::storage::{ExpirePolicy, PolicyHint, TtlStore};
///
/// #[tokio::main]
/// async fn main() {
///     let store = TtlStore::new();
///
///     assert!(store.insert(1, "a", ExpirePolicy::Never));
///     assert!(!store.insert(1, "b", ExpirePolicy::Never));
///     assert_eq!(store.get_by_key(&1), Some("a"));
///
///     store.insert(2, "b", ExpirePolicy::millis(50));
///     assert!(store.update_value(1, "c", PolicyHint::Keep));
///
///     // Key 1 was re-inserted by the update, so it is now the newest
///     let newest = store.get_by_order(1, false);
///     assert_eq!(*newest[0].key(), 1);
/// }
/// ```
pub struct TtlStore<K, V> {
    shared: Arc<Shared<K, V>>,
    sweeper: ExpirySweeper,
}

impl<K, V> std::fmt::Debug for TtlStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sizes = self.shared.index_sizes();
        f.debug_struct("TtlStore")
            .field("table", &sizes.table)
            .field("sequence", &sizes.sequence)
            .field("heap", &sizes.heap)
            .finish()
    }
}

/// Same as [`TtlStore::new`].
///
/// # Panics
///
/// Panics if called outside a Tokio runtime, since the sweeper is spawned
/// onto the current one.
impl<K, V> Default for TtlStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TtlStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates an empty store with the default sweeper settings.
    pub fn new() -> Self {
        Self::start(ExpiryConfig::default())
    }

    /// Creates an empty store with custom sweeper settings.
    pub fn with_config(config: ExpiryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::start(config))
    }

    /// Creates a store seeded with `pairs`, each inserted as never-expiring
    /// in iteration order. A repeated key keeps its first value.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let store = Self::new();
        for (key, value) in pairs {
            store.insert(key, value, ExpirePolicy::Never);
        }
        store
    }

    fn start(config: ExpiryConfig) -> Self {
        let shared = Arc::new(Shared::new());
        let sweeper = ExpirySweeper::start(Arc::clone(&shared), config);
        Self { shared, sweeper }
    }

    /// Inserts a new entry stamped with the current time.
    ///
    /// Returns `false` if the key is already present; inserts never
    /// overwrite. Use [`update_value`](Self::update_value) to replace. An
    /// expired key stays present until a read or a full sweep drops it.
    pub fn insert(&self, key: K, value: V, policy: ExpirePolicy) -> bool {
        self.shared.insert(key, value, policy)
    }

    /// [`insert`](Self::insert) reporting failure as an error.
    pub fn try_insert(&self, key: K, value: V, policy: ExpirePolicy) -> Result<()> {
        if self.insert(key, value, policy) {
            Ok(())
        } else {
            Err(StoreError::KeyAlreadyExists)
        }
    }

    /// Deletes a key. Returns `false` if it was not present.
    pub fn erase_by_key(&self, key: &K) -> bool {
        self.shared.erase_by_key(key)
    }

    /// Deletes every entry inserted within `[start, end]` and returns how
    /// many keys were removed. An inverted range removes nothing.
    pub fn erase_by_time_range(&self, start: Timestamp, end: Timestamp) -> usize {
        self.shared.erase_by_time_range(start, end)
    }

    /// Deletes the `n` oldest (`ascending`) or newest live entries.
    ///
    /// Dead entries passed on the way do not count toward `n`.
    pub fn erase_by_order(&self, n: usize, ascending: bool) -> usize {
        self.shared.erase_by_order(n, ascending)
    }

    /// Replaces the value for `key`, optionally changing its policy.
    ///
    /// The entry is re-inserted with a fresh insertion time, so it moves to
    /// the newest end of the order and range queries. With
    /// [`PolicyHint::Keep`] a relative TTL restarts from now.
    ///
    /// Returns `false` if the key is not present. An expired key that has
    /// not been dropped yet is still present and gets revived.
    pub fn update_value(&self, key: K, value: V, hint: impl Into<PolicyHint>) -> bool {
        self.shared.update_value(key, value, hint.into())
    }

    /// [`update_value`](Self::update_value) reporting failure as an error.
    pub fn try_update(&self, key: K, value: V, hint: impl Into<PolicyHint>) -> Result<()> {
        if self.update_value(key, value, hint) {
            Ok(())
        } else {
            Err(StoreError::KeyNotFound)
        }
    }

    /// Returns the value for `key` if present and live.
    ///
    /// A mapping found dead is dropped on the spot (lazy expiry).
    pub fn get_by_key(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.shared.get_by_key(key)
    }

    /// Snapshots of the live entries inserted within `[start, end]`, oldest
    /// first when `ascending`, newest first otherwise.
    pub fn get_by_time_range(
        &self,
        start: Timestamp,
        end: Timestamp,
        ascending: bool,
    ) -> Vec<Entry<K, V>>
    where
        V: Clone,
    {
        self.shared.get_by_time_range(start, end, ascending)
    }

    /// Snapshots of up to `n` live entries, oldest first when `ascending`,
    /// newest first otherwise.
    pub fn get_by_order(&self, n: usize, ascending: bool) -> Vec<Entry<K, V>>
    where
        V: Clone,
    {
        self.shared.get_by_order(n, ascending)
    }

    /// Runs one incremental sweep now, independent of the background task.
    pub fn sweep_incremental(&self) -> SweepReport {
        self.shared.sweep_incremental()
    }

    /// Runs one full sweep now, independent of the background task.
    pub fn sweep_full(&self) -> SweepReport {
        self.shared.sweep_full()
    }
}

impl<K, V> TtlStore<K, V> {
    /// Number of keys in the table. May count entries that have expired but
    /// not been looked up or swept yet.
    pub fn len(&self) -> usize {
        self.shared.index_sizes().table
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current sizes of the three indices.
    pub fn index_sizes(&self) -> IndexSizes {
        self.shared.index_sizes()
    }

    pub fn stats(&self) -> StoreStats {
        self.shared.stats()
    }

    /// Clears all three indices and signals the sweeper to stop, without
    /// waiting for it. Idempotent; also runs on drop.
    ///
    /// The store stays usable afterwards, but nothing sweeps it any more.
    pub fn shutdown(&self) {
        self.shared.clear();
        self.sweeper.stop();
        info!("Store shut down");
    }
}

impl<K, V> Drop for TtlStore<K, V> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// A store whose background sweeper effectively never fires.
    fn quiet_store<K, V>() -> TtlStore<K, V>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        TtlStore::with_config(ExpiryConfig::new().with_tick_interval(Duration::from_secs(3600)))
            .unwrap()
    }

    fn keys(entries: &[Entry<u64, String>]) -> Vec<u64> {
        entries.iter().map(|e| *e.key()).collect()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = quiet_store();

        assert!(store.insert(1, "a".to_string(), ExpirePolicy::Never));
        assert_eq!(store.get_by_key(&1), Some("a".to_string()));
        assert_eq!(store.get_by_key(&2), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_never_overwrites() {
        let store = quiet_store();

        assert!(store.insert(1, "a".to_string(), ExpirePolicy::Never));
        assert!(!store.insert(1, "b".to_string(), ExpirePolicy::Never));
        assert_eq!(
            store.try_insert(1, "b".to_string(), ExpirePolicy::Never),
            Err(StoreError::KeyAlreadyExists)
        );
        assert_eq!(store.get_by_key(&1), Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_erase_by_key_twice() {
        let store = quiet_store();
        store.insert(1, "a".to_string(), ExpirePolicy::Never);

        assert!(store.erase_by_key(&1));
        assert!(!store.erase_by_key(&1));
        assert_eq!(store.get_by_key(&1), None);

        // The slots stay until a sweep
        let sizes = store.index_sizes();
        assert_eq!((sizes.table, sizes.sequence, sizes.heap), (0, 1, 1));
        assert_eq!(store.sweep_full().total(), 2);
        assert_eq!(store.index_sizes(), IndexSizes::default());
    }

    #[tokio::test]
    async fn test_lazy_expiry_on_read() {
        let store = quiet_store();

        store.insert(1, "a", ExpirePolicy::Never);
        store.insert(2, "b", ExpirePolicy::millis(50));
        assert_eq!(store.get_by_key(&2), Some("b"));

        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(store.get_by_key(&1), Some("a"));
        assert_eq!(store.get_by_key(&2), None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().lazily_expired, 1);
    }

    #[tokio::test]
    async fn test_erase_by_order_scenario() {
        let store = quiet_store();
        for key in [1, 2, 3] {
            store.insert(key, key, ExpirePolicy::Never);
        }

        assert_eq!(store.erase_by_order(1, true), 1);
        assert_eq!(store.get_by_key(&1), None);
        assert_eq!(store.get_by_key(&2), Some(2));

        assert_eq!(store.erase_by_order(1, false), 1);
        assert_eq!(store.get_by_key(&3), None);
        assert_eq!(store.erase_by_order(5, true), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_erase_by_order_ignores_expired() {
        let store = quiet_store();
        store.insert(1, 1, ExpirePolicy::millis(10));
        store.insert(2, 2, ExpirePolicy::Never);
        store.insert(3, 3, ExpirePolicy::Never);

        std::thread::sleep(Duration::from_millis(30));

        // Key 1 is dead: skipped, not counted, not removed
        assert_eq!(store.erase_by_order(1, true), 1);
        assert_eq!(store.get_by_key(&2), None);
        assert_eq!(store.get_by_key(&3), Some(3));
        assert_eq!(store.index_sizes().table, 2);
    }

    #[tokio::test]
    async fn test_update_value() {
        let store = quiet_store();
        store.insert(1, "a".to_string(), ExpirePolicy::Never);
        store.insert(2, "b".to_string(), ExpirePolicy::Never);
        store.insert(3, "c".to_string(), ExpirePolicy::Never);

        assert!(store.update_value(1, "a2".to_string(), PolicyHint::Keep));
        assert!(!store.update_value(9, "x".to_string(), PolicyHint::Keep));
        assert_eq!(
            store.try_update(9, "x".to_string(), ExpirePolicy::Never),
            Err(StoreError::KeyNotFound)
        );

        assert_eq!(store.get_by_key(&1), Some("a2".to_string()));
        assert_eq!(keys(&store.get_by_order(3, true)), vec![2, 3, 1]);
        assert_eq!(store.stats().updates, 1);
        store.shared.assert_consistent();
    }

    #[tokio::test]
    async fn test_update_can_set_ttl() {
        let store = quiet_store();
        store.insert(1, 1, ExpirePolicy::Never);

        assert!(store.update_value(1, 2, ExpirePolicy::millis(20)));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(store.get_by_key(&1), None);
    }

    #[tokio::test]
    async fn test_expired_key_counts_until_dropped() {
        let store = quiet_store();
        store.insert(1, 1, ExpirePolicy::millis(10));
        store.insert(2, 2, ExpirePolicy::millis(10));

        std::thread::sleep(Duration::from_millis(30));

        // Neither mapping has been read or swept yet
        assert_eq!(store.len(), 2);
        assert!(!store.insert(1, 10, ExpirePolicy::Never));
        assert!(store.update_value(2, 20, PolicyHint::Keep));
        assert_eq!(store.get_by_key(&2), Some(20));

        assert_eq!(store.get_by_key(&1), None);
        assert!(store.insert(1, 10, ExpirePolicy::Never));
        assert_eq!(store.get_by_key(&1), Some(10));
        store.shared.assert_consistent();
    }

    #[tokio::test]
    async fn test_get_by_order() {
        let store = quiet_store();
        for key in 0..5u64 {
            store.insert(key, format!("v{}", key), ExpirePolicy::Never);
        }
        store.erase_by_key(&0);

        assert_eq!(keys(&store.get_by_order(2, true)), vec![1, 2]);
        assert_eq!(keys(&store.get_by_order(2, false)), vec![4, 3]);
        assert_eq!(keys(&store.get_by_order(10, true)), vec![1, 2, 3, 4]);
        assert!(store.get_by_order(0, true).is_empty());
    }

    #[tokio::test]
    async fn test_get_by_time_range() {
        let store = quiet_store();
        let before = Instant::now();
        for key in 0..3u64 {
            store.insert(key, format!("v{}", key), ExpirePolicy::Never);
        }
        std::thread::sleep(Duration::from_millis(5));
        let middle = Instant::now();
        std::thread::sleep(Duration::from_millis(5));
        for key in 3..6u64 {
            store.insert(key, format!("v{}", key), ExpirePolicy::Never);
        }
        let after = Instant::now();

        assert_eq!(keys(&store.get_by_time_range(before, middle, true)), vec![0, 1, 2]);
        assert_eq!(keys(&store.get_by_time_range(middle, after, false)), vec![5, 4, 3]);
        assert_eq!(store.get_by_time_range(before, after, true).len(), 6);
        assert!(store.get_by_time_range(after, before, true).is_empty());
    }

    #[tokio::test]
    async fn test_queries_skip_entries_past_their_ttl() {
        let store = quiet_store();
        let before = Instant::now();
        store.insert(0, "short".to_string(), ExpirePolicy::millis(10));
        store.insert(1, "long".to_string(), ExpirePolicy::Never);
        store.insert(2, "short".to_string(), ExpirePolicy::millis(10));
        let after = Instant::now();

        assert_eq!(keys(&store.get_by_order(10, true)), vec![0, 1, 2]);

        std::thread::sleep(Duration::from_millis(30));

        // Nothing has been erased or swept; the TTL alone hides them
        assert_eq!(store.index_sizes().table, 3);
        assert_eq!(keys(&store.get_by_order(10, true)), vec![1]);
        assert_eq!(keys(&store.get_by_order(10, false)), vec![1]);
        assert_eq!(keys(&store.get_by_time_range(before, after, true)), vec![1]);
        assert_eq!(keys(&store.get_by_time_range(before, after, false)), vec![1]);
    }

    #[tokio::test]
    async fn test_erase_by_time_range() {
        let store = quiet_store();
        for key in 0..3u64 {
            store.insert(key, key, ExpirePolicy::Never);
        }
        std::thread::sleep(Duration::from_millis(5));
        let middle = Instant::now();
        for key in 3..6u64 {
            store.insert(key, key, ExpirePolicy::Never);
        }
        std::thread::sleep(Duration::from_millis(5));
        let after = Instant::now();

        assert_eq!(store.erase_by_time_range(after, middle), 0);
        assert_eq!(store.erase_by_time_range(middle, after), 3);
        assert_eq!(store.erase_by_time_range(middle, after), 0);
        assert_eq!(store.len(), 3);
        assert_eq!(store.stats().erased, 3);
    }

    #[tokio::test]
    async fn test_snapshot_entries_are_copies() {
        let store = quiet_store();
        store.insert(1, "a".to_string(), ExpirePolicy::Never);

        let entries = store.get_by_order(1, true);
        store.erase_by_key(&1);

        // The returned snapshot is unaffected by the later delete
        assert_eq!(entries[0].value(), "a");
        assert!(!entries[0].is_tombstoned());
    }

    #[tokio::test]
    async fn test_from_pairs() {
        let store = TtlStore::from_pairs(vec![(1, "a"), (2, "b"), (1, "c")]);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get_by_key(&1), Some("a"));
        assert_eq!(store.get_by_order(1, false)[0].policy(), ExpirePolicy::Never);
    }

    #[tokio::test]
    async fn test_with_config_rejects_invalid() {
        let result = TtlStore::<u64, u64>::with_config(ExpiryConfig::new().with_full_sweep_every(0));
        assert!(matches!(result, Err(StoreError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_manual_sweeps() {
        let store = quiet_store();
        store.insert(1, 1, ExpirePolicy::millis(10));
        store.insert(2, 2, ExpirePolicy::Never);
        std::thread::sleep(Duration::from_millis(30));

        let report = store.sweep_incremental();
        assert_eq!(report.heap, 1);
        // Incremental sweeps leave the table and sequence alone
        assert_eq!(store.index_sizes().sequence, 2);

        let report = store.sweep_full();
        assert_eq!((report.sequence, report.table), (1, 1));

        let stats = store.stats();
        assert_eq!(stats.incremental_sweeps, 1);
        assert_eq!(stats.full_sweeps, 1);
        assert_eq!(stats.reclaimed, 3);
    }

    #[tokio::test]
    async fn test_shutdown_clears_indices() {
        let store = quiet_store();
        store.insert(1, 1, ExpirePolicy::Never);
        store.insert(2, 2, ExpirePolicy::Never);

        store.shutdown();
        store.shutdown();

        assert_eq!(store.index_sizes(), IndexSizes::default());
        assert_eq!(store.get_by_key(&1), None);
    }

    #[tokio::test]
    async fn test_background_sweeper_compacts() {
        let store = TtlStore::with_config(
            ExpiryConfig::new()
                .with_tick_interval(Duration::from_millis(5))
                .with_full_sweep_every(5),
        )
        .unwrap();
        for key in 0..20u64 {
            store.insert(key, key, ExpirePolicy::millis(10));
        }
        store.insert(100, 100, ExpirePolicy::Never);
        store.erase_by_key(&100);

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.index_sizes(), IndexSizes::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_access() {
        use std::thread;

        let store = Arc::new(TtlStore::<u64, u64>::with_config(
            ExpiryConfig::new()
                .with_tick_interval(Duration::from_millis(1))
                .with_full_sweep_every(10),
        )
        .unwrap());
        let mut handles = vec![];

        for t in 0..8u64 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..500u64 {
                    let key = (t * 31 + i) % 200;
                    match i % 5 {
                        0 => {
                            store.insert(key, i, ExpirePolicy::millis(i % 7));
                        }
                        1 => {
                            store.update_value(key, i, PolicyHint::Keep);
                        }
                        2 => {
                            store.erase_by_key(&key);
                        }
                        3 => {
                            let entries = store.get_by_order(10, i % 2 == 0);
                            assert!(entries.len() <= 10);
                        }
                        _ => {
                            store.insert(key, i, ExpirePolicy::Never);
                            store.get_by_key(&key);
                        }
                    }
                }
                store.erase_by_order(3, t % 2 == 0);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        store.shared.assert_consistent();

        // Order query sees each key at most once, oldest first
        let entries = store.get_by_order(usize::MAX, true);
        let mut seen = std::collections::HashSet::new();
        for pair in entries.windows(2) {
            assert!(pair[0].insert_time() <= pair[1].insert_time());
        }
        for entry in &entries {
            assert!(seen.insert(*entry.key()), "duplicate live key");
        }
    }
}
