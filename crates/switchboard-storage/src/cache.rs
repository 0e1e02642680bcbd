//! In-process snapshot cache with atomic replacement.
//!
//! The cache holds a single lock-free pointer to the current immutable
//! [`Snapshot`]. Readers load the pointer once per evaluation and keep the
//! same snapshot for its whole duration; a background task periodically
//! rebuilds the snapshot from the authoritative store and swaps the pointer
//! in one atomic store. A failed reload leaves the previous snapshot in
//! place and increments a failure counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use switchboard_core::Snapshot;

use crate::error::StorageResult;
use crate::traits::CorpusStore;

/// The shared snapshot cache.
pub struct SnapshotCache {
    current: ArcSwap<Snapshot>,
    versions: AtomicU64,
    reload_failures: AtomicU64,
}

impl SnapshotCache {
    /// Creates a cache holding an empty snapshot.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::empty()),
            versions: AtomicU64::new(0),
            reload_failures: AtomicU64::new(0),
        }
    }

    /// Returns the current snapshot handle.
    ///
    /// The handle stays valid for as long as the caller holds it, even
    /// across concurrent swaps.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Number of reloads that failed since startup.
    pub fn reload_failures(&self) -> u64 {
        self.reload_failures.load(Ordering::Relaxed)
    }

    /// Reloads the corpus, compiles it, and swaps the snapshot pointer.
    ///
    /// Any failure (store unavailable, fatal compile error, or a per-flag
    /// timestamp regression against the current snapshot) retains the
    /// previous snapshot.
    pub async fn refresh<S: CorpusStore>(&self, store: &S) -> StorageResult<Arc<Snapshot>> {
        match self.try_refresh(store).await {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => {
                self.reload_failures.fetch_add(1, Ordering::Relaxed);
                Err(err)
            },
        }
    }

    async fn try_refresh<S: CorpusStore>(&self, store: &S) -> StorageResult<Arc<Snapshot>> {
        let corpus = store.load_all().await?;
        let version = self.versions.fetch_add(1, Ordering::Relaxed) + 1;
        let next = Snapshot::compile(corpus, version)?;

        let previous = self.current.load();
        Snapshot::validate_succession(&previous, &next)?;

        for (flag_id, reason) in next.rejected() {
            tracing::warn!(flag = %flag_id, error = %reason, "flag excluded from snapshot");
        }

        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        tracing::debug!(
            version = next.version(),
            flags = next.len(),
            "snapshot replaced"
        );
        Ok(next)
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the background reload task.
///
/// The task refreshes on every interval tick until the shutdown signal
/// flips (or its sender drops). A reload already in flight completes
/// before the task exits.
pub fn spawn_refresher<S>(
    cache: Arc<SnapshotCache>,
    store: S,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    S: CorpusStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {},
                _ = shutdown.changed() => break,
            }
            if let Err(err) = cache.refresh(&store).await {
                tracing::warn!(error = %err, "snapshot reload failed; previous snapshot retained");
            }
            if *shutdown.borrow() {
                break;
            }
        }
        tracing::info!("snapshot refresher stopped");
    })
}
