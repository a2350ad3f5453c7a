//! The three coupled indices behind a [`TtlStore`](crate::storage::TtlStore).
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!   table         │ HashMap<K, Arc<Entry>>       │  authoritative membership
//!                 └──────────────┬───────────────┘
//!                                │ same Arc
//!                 ┌──────────────┴───────────────┐
//!   sequence      │ VecDeque<Arc<Entry>>         │  append-only, insert order
//!                 └──────────────┬───────────────┘
//!                                │ same Arc
//!                 ┌──────────────┴───────────────┐
//!   heap          │ BinaryHeap<ByDeadline>       │  soonest deadline on top
//!                 └──────────────────────────────┘
//! ```
//!
//! Nothing in here locks. The store wraps one [`IndexState`] in a single
//! mutex and every method below assumes the caller holds it. The only code
//! that runs without the lock is the snapshot scanning at the bottom of the
//! file, which works on a cloned `sequence`.
//!
//! Deleting from the middle of the sequence or the heap is expensive, so
//! removals only drop the `table` mapping and tombstone the entry. The dead
//! `Arc`s stay in the other two indices until a sweep reclaims them.

use crate::storage::entry::{Entry, ExpirePolicy, PolicyHint, Timestamp};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::hash::Hash;
use std::ops::Range;
use std::sync::Arc;

/// Shared handle to an entry; every index holds one of these.
pub(crate) type EntryRef<K, V> = Arc<Entry<K, V>>;

/// Insertion-ordered sequence of entries.
pub(crate) type Sequence<K, V> = VecDeque<EntryRef<K, V>>;

/// Heap slot ordering entries so the soonest deadline is at the top.
/// Never-expiring entries sort below every finite deadline.
struct ByDeadline<K, V>(EntryRef<K, V>);

fn cmp_deadline(a: Option<Timestamp>, b: Option<Timestamp>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a.cmp(&b),
    }
}

impl<K, V> Ord for ByDeadline<K, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap
        cmp_deadline(other.0.expires_at(), self.0.expires_at())
    }
}

impl<K, V> PartialOrd for ByDeadline<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, V> PartialEq for ByDeadline<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K, V> Eq for ByDeadline<K, V> {}

/// Result of a key lookup under the lock.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Lookup<V> {
    Hit(V),
    Missing,
    /// The mapping existed but was no longer live; it has been dropped.
    Expired,
}

/// Index slots reclaimed by a single sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Slots popped from the expiry heap
    pub heap: usize,
    /// Slots dropped from the insertion-ordered sequence
    pub sequence: usize,
    /// Mappings dropped from the key table
    pub table: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.heap + self.sequence + self.table
    }
}

/// Sizes of the three indices at one point in time.
///
/// `sequence` and `heap` count tombstoned slots that have not been swept
/// yet, so they are always at least `table`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSizes {
    pub table: usize,
    pub sequence: usize,
    pub heap: usize,
}

/// The three indices over one set of entries.
pub(crate) struct IndexState<K, V> {
    table: HashMap<K, EntryRef<K, V>>,
    sequence: Sequence<K, V>,
    heap: BinaryHeap<ByDeadline<K, V>>,
}

impl<K, V> Default for IndexState<K, V> {
    fn default() -> Self {
        Self {
            table: HashMap::new(),
            sequence: VecDeque::new(),
            heap: BinaryHeap::new(),
        }
    }
}

impl<K, V> IndexState<K, V> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn sizes(&self) -> IndexSizes {
        IndexSizes {
            table: self.table.len(),
            sequence: self.sequence.len(),
            heap: self.heap.len(),
        }
    }

    /// Moves all entries out, leaving the indices empty. The caller drops the
    /// returned state after releasing the lock.
    pub(crate) fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

impl<K, V> IndexState<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Drops the table mapping for `key` if it is no longer live at `now`,
    /// so the key counts as absent from here on.
    fn purge_stale(&mut self, key: &K, now: Timestamp) {
        let stale = matches!(self.table.get(key), Some(entry) if !entry.is_live(now));
        if stale {
            if let Some(entry) = self.table.remove(key) {
                entry.tombstone();
            }
        }
    }

    /// Inserts a fresh entry stamped with `now`. Fails if `key` is mapped,
    /// even by an expired entry no read or sweep has dropped yet; inserts
    /// never overwrite.
    pub(crate) fn insert(&mut self, key: K, value: V, policy: ExpirePolicy, now: Timestamp) -> bool {
        if self.table.contains_key(&key) {
            return false;
        }

        debug_assert!(
            self.sequence.back().map_or(true, |last| last.insert_time() <= now),
            "insertion sequence must stay sorted by insert time"
        );

        let entry = Arc::new(Entry::new(key.clone(), value, policy, now));
        self.heap.push(ByDeadline(Arc::clone(&entry)));
        self.sequence.push_back(Arc::clone(&entry));
        self.table.insert(key, entry);
        true
    }

    /// Tombstones the entry for `key` and drops its mapping. The heap and
    /// sequence slots are left for the sweeper.
    pub(crate) fn erase_key(&mut self, key: &K) -> bool {
        match self.table.remove(key) {
            Some(entry) => {
                entry.tombstone();
                true
            }
            None => false,
        }
    }

    /// Tombstones every entry inserted within `[start, end]` and drops the
    /// mappings that still point at them. Returns the number of mappings
    /// dropped.
    pub(crate) fn erase_time_range(&mut self, start: Timestamp, end: Timestamp) -> usize {
        if start > end {
            return 0;
        }

        let range = time_range(&self.sequence, start, end);
        let mut erased = 0;
        for entry in self.sequence.range(range) {
            entry.tombstone();
            if remove_if_current(&mut self.table, entry) {
                erased += 1;
            }
        }
        erased
    }

    /// Erases up to `n` live entries walking from the oldest (`ascending`)
    /// or the newest end. Dead entries met on the way are skipped: they do
    /// not count toward `n` and are left for the sweeper.
    pub(crate) fn erase_by_order(&mut self, n: usize, ascending: bool, now: Timestamp) -> usize {
        if n == 0 {
            return 0;
        }

        let table = &mut self.table;
        if ascending {
            erase_first_live(table, self.sequence.iter(), n, now)
        } else {
            erase_first_live(table, self.sequence.iter().rev(), n, now)
        }
    }

    /// Replaces the entry for `key` with a new one stamped `now`, moving it
    /// to the tail of the insertion order. A mapping that has expired but is
    /// still in the table counts as present.
    pub(crate) fn update(&mut self, key: K, value: V, hint: PolicyHint, now: Timestamp) -> bool {
        let policy = match self.table.remove(&key) {
            Some(old) => {
                old.tombstone();
                hint.resolve(old.policy())
            }
            None => return false,
        };

        let inserted = self.insert(key, value, policy, now);
        assert!(inserted, "key table still held a key that was just removed");
        true
    }

    /// Looks `key` up, dropping the mapping if it turns out to be dead.
    pub(crate) fn lookup(&mut self, key: &K, now: Timestamp) -> Lookup<V>
    where
        V: Clone,
    {
        match self.table.get(key) {
            None => Lookup::Missing,
            Some(entry) if entry.is_live(now) => Lookup::Hit(entry.value().clone()),
            Some(_) => {
                self.purge_stale(key, now);
                Lookup::Expired
            }
        }
    }

    /// Shallow copy of the insertion-ordered sequence.
    pub(crate) fn snapshot(&self) -> Sequence<K, V> {
        self.sequence.clone()
    }

    /// Pops dead entries off the top of the heap, stopping at the first live
    /// one. Leaves the table and the sequence alone.
    pub(crate) fn sweep_incremental(&mut self, now: Timestamp) -> SweepReport {
        let mut report = SweepReport::default();
        while let Some(top) = self.heap.peek() {
            if top.0.is_live(now) {
                break;
            }
            top.0.tombstone();
            self.heap.pop();
            report.heap += 1;
        }
        report
    }

    /// Rebuilds all three indices keeping only live entries.
    pub(crate) fn sweep_full(&mut self, now: Timestamp) -> SweepReport {
        let before = self.sizes();

        self.heap.retain(|slot| retain_live(&slot.0, now));
        self.sequence.retain(|entry| retain_live(entry, now));
        self.table.retain(|_, entry| retain_live(entry, now));

        let after = self.sizes();
        SweepReport {
            heap: before.heap - after.heap,
            sequence: before.sequence - after.sequence,
            table: before.table - after.table,
        }
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert!(
            self.sequence
                .iter()
                .zip(self.sequence.iter().skip(1))
                .all(|(a, b)| a.insert_time() <= b.insert_time()),
            "sequence out of insertion order"
        );
        let now = std::time::Instant::now();
        for (key, entry) in &self.table {
            assert!(entry.key() == key, "table maps a key to a foreign entry");
            assert!(
                self.sequence.iter().any(|e| Arc::ptr_eq(e, entry)),
                "table entry missing from the sequence"
            );
            // Incremental sweeps may pop dead entries the table still maps
            if entry.is_live(now) {
                assert!(
                    self.heap.iter().any(|slot| Arc::ptr_eq(&slot.0, entry)),
                    "live table entry missing from the heap"
                );
            }
        }
    }
}

fn retain_live<K, V>(entry: &EntryRef<K, V>, now: Timestamp) -> bool {
    if entry.is_live(now) {
        true
    } else {
        entry.tombstone();
        false
    }
}

/// Drops the mapping for `entry`'s key, but only if it still points at this
/// exact entry and not at a newer one inserted under the same key.
fn remove_if_current<K, V>(table: &mut HashMap<K, EntryRef<K, V>>, entry: &EntryRef<K, V>) -> bool
where
    K: Eq + Hash,
{
    match table.get(entry.key()) {
        Some(current) if Arc::ptr_eq(current, entry) => {
            table.remove(entry.key());
            true
        }
        _ => false,
    }
}

fn erase_first_live<'a, K, V, I>(
    table: &mut HashMap<K, EntryRef<K, V>>,
    entries: I,
    n: usize,
    now: Timestamp,
) -> usize
where
    K: Eq + Hash + 'a,
    V: 'a,
    I: Iterator<Item = &'a EntryRef<K, V>>,
{
    let mut erased = 0;
    for entry in entries {
        if !entry.is_live(now) {
            continue;
        }
        entry.tombstone();
        if remove_if_current(table, entry) {
            erased += 1;
        }
        if erased == n {
            break;
        }
    }
    erased
}

/// Index range of `sequence` whose insert times fall within `[start, end]`.
///
/// Two binary searches: `low` is the first slot with `insert_time >= start`,
/// `high` the first with `insert_time > end`. Relies on the sequence being
/// sorted by insert time.
pub(crate) fn time_range<K, V>(
    sequence: &Sequence<K, V>,
    start: Timestamp,
    end: Timestamp,
) -> Range<usize> {
    let low = sequence.partition_point(|entry| entry.insert_time() < start);
    let high = sequence.partition_point(|entry| entry.insert_time() <= end);
    low..high.max(low)
}

/// Live entries of `snapshot` inserted within `[start, end]`, evaluated at
/// `now`. Runs without the store lock.
pub(crate) fn collect_time_range<K, V>(
    snapshot: &Sequence<K, V>,
    start: Timestamp,
    end: Timestamp,
    ascending: bool,
    now: Timestamp,
) -> Vec<Entry<K, V>>
where
    K: Clone,
    V: Clone,
{
    if start > end {
        return Vec::new();
    }

    let slice = snapshot.range(time_range(snapshot, start, end));
    let live = |entry: &&EntryRef<K, V>| entry.is_live(now);
    if ascending {
        slice.filter(live).map(|e| (**e).clone()).collect()
    } else {
        slice.rev().filter(live).map(|e| (**e).clone()).collect()
    }
}

/// Up to `n` live entries of `snapshot` from the oldest (`ascending`) or the
/// newest end. Runs without the store lock.
pub(crate) fn collect_by_order<K, V>(
    snapshot: &Sequence<K, V>,
    n: usize,
    ascending: bool,
    now: Timestamp,
) -> Vec<Entry<K, V>>
where
    K: Clone,
    V: Clone,
{
    let live = |entry: &&EntryRef<K, V>| entry.is_live(now);
    if ascending {
        snapshot.iter().filter(live).take(n).map(|e| (**e).clone()).collect()
    } else {
        snapshot
            .iter()
            .rev()
            .filter(live)
            .take(n)
            .map(|e| (**e).clone())
            .collect()
    }
}
