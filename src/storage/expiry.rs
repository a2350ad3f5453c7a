//! Background Expiry Sweeper
//!
//! Reads check liveness lazily, so an expired entry that is never read again
//! would sit in the indices forever. Deletes have the same problem in
//! reverse: they only drop the key mapping and leave tombstoned slots in the
//! insertion sequence and the expiry heap. The sweeper reclaims both.
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and on every tick:
//! 1. Sleeps for `tick_interval` (default: 5ms)
//! 2. Checks for the shutdown signal
//! 3. Runs either an incremental sweep (pop dead entries off the top of the
//!    expiry heap) or, every `full_sweep_every` ticks, a full sweep that
//!    rebuilds all three indices
//!
//! Incremental sweeps cost O(k) in the number of freshly expired entries.
//! Full sweeps cost O(n) and are the only thing that clears tombstones
//! buried below live entries in the heap, or anything in the sequence.
//!
//! ## Lifetime
//!
//! The task owns an `Arc` of the store's synchronized state, not the store
//! itself, so dropping the store never leaves the task pointing at freed
//! indices. Shutdown does not wait for the task: the current sleep finishes,
//! the task sees the signal and exits, releasing its `Arc`.

use crate::error::{Result, StoreError};
use crate::storage::engine::Shared;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Default time between sweeper ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(5);

/// Default number of ticks between two full sweeps.
pub const FULL_SWEEP_EVERY: u32 = 100;

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval between sweeper ticks (default: 5ms)
    pub tick_interval: Duration,

    /// Every this many ticks the sweeper runs a full sweep instead of an
    /// incremental one (default: 100)
    pub full_sweep_every: u32,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            full_sweep_every: FULL_SWEEP_EVERY,
        }
    }
}

impl ExpiryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interval between sweeper ticks.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets how many ticks pass between two full sweeps.
    pub fn with_full_sweep_every(mut self, ticks: u32) -> Self {
        self.full_sweep_every = ticks;
        self
    }

    /// Rejects settings that would make the sweeper spin or never compact.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(StoreError::InvalidConfig(
                "tick_interval must be non-zero".into(),
            ));
        }
        if self.full_sweep_every == 0 {
            return Err(StoreError::InvalidConfig(
                "full_sweep_every must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// A handle to the running expiry sweeper.
///
/// Dropping the handle signals the sweeper to stop. The task exits at its
/// next wake-up; nothing waits for it.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper task over `shared`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub(crate) fn start<K, V>(shared: Arc<Shared<K, V>>, config: ExpiryConfig) -> Self
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(shared, config, shutdown_rx));

        info!("Background expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Signals the sweeper to stop. Idempotent.
    pub fn stop(&self) {
        let already_stopped = self.shutdown_tx.send_replace(true);
        if !already_stopped {
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn stop_requested(shutdown_rx: &watch::Receiver<bool>) -> bool {
    // A dropped sender counts as a stop signal too
    shutdown_rx.has_changed().is_err() || *shutdown_rx.borrow()
}

/// The main sweeper loop.
async fn sweeper_loop<K, V>(
    shared: Arc<Shared<K, V>>,
    config: ExpiryConfig,
    shutdown_rx: watch::Receiver<bool>,
) where
    K: Eq + Hash + Clone,
{
    let mut ticks = 0u32;

    loop {
        // The current sleep always runs to completion before the stop
        // signal is looked at.
        tokio::time::sleep(config.tick_interval).await;

        if stop_requested(&shutdown_rx) {
            debug!("Expiry sweeper received shutdown signal");
            return;
        }

        ticks += 1;
        if ticks >= config.full_sweep_every {
            ticks = 0;
            let report = shared.sweep_full();
            let sizes = shared.index_sizes();
            debug!(
                heap = report.heap,
                sequence = report.sequence,
                table = report.table,
                live_keys = sizes.table,
                "Full sweep compacted indices"
            );
        } else {
            let report = shared.sweep_incremental();
            if report.heap > 0 {
                debug!(popped = report.heap, "Expired entries popped from heap");
            } else {
                trace!("Incremental sweep found nothing to reclaim");
            }
        }
    }
}
