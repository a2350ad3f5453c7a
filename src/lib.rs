//! # TideKV - A Concurrent In-Memory TTL Map
//!
//! TideKV is an in-memory key-value map where every entry carries its own
//! time-to-live. Besides the usual lookup by key, entries can be queried and
//! erased by insertion order and by insertion-time range, all from many
//! threads at once.
//!
//! ## Features
//!
//! - **Three Indices, One Lock**: a key table, an insertion-ordered sequence
//!   and an expiry heap kept mutually consistent under a single mutex
//! - **TTL Support**: per-entry relative, absolute or no expiry
//! - **Snapshot Reads**: order and range queries copy a cheap snapshot under
//!   the lock and scan it outside
//! - **Lazy + Active Expiry**: dead entries vanish from queries immediately
//!   and are reclaimed by a background Tokio task
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              TideKV                                     │
//! │                                                                         │
//! │  ┌─────────────┐    insert / erase / update / get                       │
//! │  │   Callers   │───────────────────────────┐                            │
//! │  │ (any thread)│                           │                            │
//! │  └─────────────┘                           ▼                            │
//! │                     ┌──────────────────────────────────────────────┐   │
//! │                     │              TtlStore<K, V>                  │   │
//! │                     │  ┌────────┐   ┌──────────┐   ┌────────────┐  │   │
//! │                     │  │ table  │   │ sequence │   │ expiry heap│  │   │
//! │                     │  └────────┘   └──────────┘   └────────────┘  │   │
//! │                     │               one Mutex                      │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                                               ▲                         │
//! │                                               │                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use tidekv::{ExpirePolicy, PolicyHint, TtlStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     // The store starts its own expiry sweeper
//!     let store = Arc::new(TtlStore::new());
//!
//!     store.insert(1, "a", ExpirePolicy::Never);
//!     store.insert(2, "b", ExpirePolicy::millis(50));
//!
//!     // Replacing a value moves the key to the newest end of the order
//!     store.update_value(1, "c", PolicyHint::Keep);
//!
//!     let oldest = store.get_by_order(10, true);
//!     let erased = store.erase_by_order(1, true);
//! }
//! ```
//!
//! ## Operations
//!
//! - `insert(key, value, policy)` - never overwrites
//! - `erase_by_key(key)`
//! - `erase_by_time_range(start, end)`
//! - `erase_by_order(n, ascending)`
//! - `update_value(key, value, hint)`
//! - `get_by_key(key)`
//! - `get_by_time_range(start, end, ascending)`
//! - `get_by_order(n, ascending)`
//!
//! ## Module Overview
//!
//! - [`storage`]: entries, the index store and the expiry sweeper
//! - [`error`]: the crate error type
//!
//! ## Design Highlights
//!
//! ### Tombstones
//!
//! Removing an arbitrary element from the middle of a heap or a deque is
//! expensive. Deletes therefore only drop the key mapping and flag the entry;
//! every query skips flagged entries, and sweeps reclaim their slots.
//!
//! ### Two Sweep Cadences
//!
//! Most ticks only pop dead entries off the top of the expiry heap. Every
//! hundredth tick rebuilds all three indices, which is the only way to clear
//! tombstones buried under live entries.

pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use error::{Result, StoreError};
pub use storage::{
    Entry, ExpirePolicy, ExpiryConfig, IndexSizes, PolicyHint, StoreStats, SweepReport, Timestamp,
    TtlStore,
};

/// Version of TideKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
