//! Stored entries and their expiration policies.
//!
//! An [`Entry`] is created once per insert and then shared (behind an `Arc`)
//! by all three indices of the store. Its key, value and timing data never
//! change; the only mutable bit is the tombstone flag, which flips from
//! `false` to `true` exactly once when the entry is logically deleted.
//!
//! Because range and order queries check liveness *after* releasing the
//! store lock, the flag is an atomic rather than a plain `bool`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Point in time used for insertion and expiry stamps.
///
/// Backed by the monotonic clock, so successive insert stamps taken under
/// the store lock never go backwards.
pub type Timestamp = Instant;

/// How long an entry stays live after it is inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExpirePolicy {
    /// The entry never expires.
    #[default]
    Never,
    /// The entry expires this long after its insertion time.
    After(Duration),
    /// The entry expires at a fixed point in time.
    At(Timestamp),
}

impl ExpirePolicy {
    /// Shorthand for [`ExpirePolicy::After`] with a millisecond interval.
    pub fn millis(ms: u64) -> Self {
        ExpirePolicy::After(Duration::from_millis(ms))
    }

    /// Resolves the policy into an absolute deadline for an entry inserted
    /// at `insert_time`. `None` means the entry never expires.
    pub fn deadline(&self, insert_time: Timestamp) -> Option<Timestamp> {
        match *self {
            ExpirePolicy::Never => None,
            // An interval too large to represent is as good as never.
            ExpirePolicy::After(ttl) => insert_time.checked_add(ttl),
            ExpirePolicy::At(at) => Some(at),
        }
    }
}

/// Policy argument for `update_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolicyHint {
    /// Keep the policy of the entry being replaced. A relative TTL is
    /// re-armed from the new insertion time; a never-expiring entry stays
    /// never-expiring.
    #[default]
    Keep,
    /// Replace the policy outright.
    Replace(ExpirePolicy),
}

impl From<ExpirePolicy> for PolicyHint {
    fn from(policy: ExpirePolicy) -> Self {
        PolicyHint::Replace(policy)
    }
}

impl PolicyHint {
    /// Chooses the policy for a replacement of an entry whose policy was `old`.
    pub fn resolve(self, old: ExpirePolicy) -> ExpirePolicy {
        match self {
            PolicyHint::Keep => old,
            PolicyHint::Replace(policy) => policy,
        }
    }
}

/// One stored key/value pair plus its timing and tombstone metadata.
#[derive(Debug)]
pub struct Entry<K, V> {
    key: K,
    value: V,
    insert_time: Timestamp,
    policy: ExpirePolicy,
    expires_at: Option<Timestamp>,
    tombstoned: AtomicBool,
}

impl<K, V> Entry<K, V> {
    /// Creates a live entry stamped with `insert_time`.
    pub(crate) fn new(key: K, value: V, policy: ExpirePolicy, insert_time: Timestamp) -> Self {
        Self {
            key,
            value,
            insert_time,
            policy,
            expires_at: policy.deadline(insert_time),
            tombstoned: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// When this entry was inserted. Order and range queries sort on this.
    pub fn insert_time(&self) -> Timestamp {
        self.insert_time
    }

    /// The policy the entry was inserted with.
    pub fn policy(&self) -> ExpirePolicy {
        self.policy
    }

    /// Absolute expiry deadline (`None` = never expires).
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }

    pub fn is_tombstoned(&self) -> bool {
        self.tombstoned.load(Ordering::Acquire)
    }

    /// Marks the entry as logically deleted.
    ///
    /// Returns `true` if this call flipped the flag, `false` if the entry was
    /// already tombstoned. The flag is never cleared.
    pub(crate) fn tombstone(&self) -> bool {
        !self.tombstoned.swap(true, Ordering::AcqRel)
    }

    /// Whether the entry is visible at `now`: not tombstoned, and either
    /// never-expiring or not yet past its deadline (the deadline itself still
    /// counts as live).
    #[inline]
    pub fn is_live(&self, now: Timestamp) -> bool {
        if self.is_tombstoned() {
            return false;
        }
        match self.expires_at {
            None => true,
            Some(deadline) => now <= deadline,
        }
    }

    /// Negation of [`is_live`](Self::is_live) evaluated against the current clock.
    #[inline]
    pub fn is_expired(&self) -> bool {
        !self.is_live(Instant::now())
    }

    /// Time left before the entry expires, `None` if it never expires.
    /// Returns `Duration::ZERO` once the deadline has passed.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

/// Cloning takes a snapshot, including the tombstone flag as of now.
impl<K: Clone, V: Clone> Clone for Entry<K, V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            insert_time: self.insert_time,
            policy: self.policy,
            expires_at: self.expires_at,
            tombstoned: AtomicBool::new(self.is_tombstoned()),
        }
    }
}
