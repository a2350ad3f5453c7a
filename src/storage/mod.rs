//! Storage Module
//!
//! This module provides the concurrent TTL map at the heart of TideKV:
//! the entry type, the three coupled indices, the public store handle and
//! the background expiry sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TtlStore<K, V>                         │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                 Mutex<IndexState>                    │   │
//! │  │  ┌──────────┐   ┌──────────────┐   ┌─────────────┐   │   │
//! │  │  │  table   │   │   sequence   │   │ expiry heap │   │   │
//! │  │  │ K → Arc  │   │ insert order │   │  deadline   │   │   │
//! │  │  └──────────┘   └──────────────┘   └─────────────┘   │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Three Query Modes**: by key, by insertion order, by insertion-time range
//! - **TTL Support**: relative, absolute or no expiry per entry
//! - **Lazy Expiry**: dead entries are invisible as soon as their deadline passes
//! - **Tombstones**: deletes are O(1) on the hot path; slots are reclaimed later
//! - **Two Sweep Cadences**: cheap incremental heap pops, periodic full compaction
//!
//! ## Example
//!
//! ```
//! use tidekv::storage::{ExpirePolicy, TtlStore};
//! use std::time::{Duration, Instant};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = TtlStore::new();
//!     let start = Instant::now();
//!
//!     store.insert("session", "token123", ExpirePolicy::After(Duration::from_secs(3600)));
//!     store.insert("user", "alice", ExpirePolicy::Never);
//!
//!     let recent = store.get_by_time_range(start, Instant::now(), true);
//!     assert_eq!(recent.len(), 2);
//!     assert_eq!(*recent[0].key(), "session");
//! }
//! ```

pub mod engine;
pub mod entry;
pub mod expiry;
mod index;

// Re-export commonly used types
pub use engine::{StoreStats, TtlStore};
pub use entry::{Entry, ExpirePolicy, PolicyHint, Timestamp};
pub use expiry::{ExpiryConfig, ExpirySweeper, DEFAULT_TICK_INTERVAL, FULL_SWEEP_EVERY};
pub use index::{IndexSizes, SweepReport};
