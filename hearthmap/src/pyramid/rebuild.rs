//! Incremental pyramid rebuild from dirty markers.
//!
//! Consumes dirty markers in (zoom ascending, map, coordinate) order so
//! each level's prerequisites are rebuilt before the level that needs
//! them. One marker failing never blocks the rest of the batch: the
//! failure is logged, the marker stays for a later attempt, and the
//! runner moves on.

use super::builder::PyramidBuilder;
use crate::store::{with_retry, Datastore, DirtyMarker, RetryConfig, Scope, StoreError, TileKey};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Default bound on markers processed per invocation.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Outcome counters for one rebuild pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    /// Markers taken from the store
    pub processed: usize,
    /// Parent tiles built and markers cleared
    pub built: usize,
    /// Markers cleared because no children existed
    pub skipped_no_children: usize,
    /// Markers left in place after a failure
    pub failed: usize,
}

impl RebuildStats {
    fn merge(&mut self, other: RebuildStats) {
        self.processed += other.processed;
        self.built += other.built;
        self.skipped_no_children += other.skipped_no_children;
        self.failed += other.failed;
    }

    /// Whether the pass moved any marker toward resolution.
    fn made_progress(&self) -> bool {
        self.built > 0 || self.skipped_no_children > 0
    }
}

/// Drains dirty markers through a [`PyramidBuilder`].
pub struct RebuildRunner<S: Datastore> {
    store: Arc<S>,
    builder: Arc<PyramidBuilder<S>>,
    retry: RetryConfig,
    batch_size: usize,
}

impl<S: Datastore + 'static> RebuildRunner<S> {
    pub fn new(store: Arc<S>, builder: Arc<PyramidBuilder<S>>, retry: RetryConfig) -> Self {
        Self {
            store,
            builder,
            retry,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Overrides the per-invocation marker bound.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Processes one bounded batch of dirty markers.
    pub async fn run_batch(
        &self,
        scope: Scope<'_>,
        cancel: &CancellationToken,
    ) -> Result<RebuildStats, StoreError> {
        let batch = with_retry("dirty_batch", &self.retry, || {
            self.store.dirty_batch(scope, self.batch_size)
        })
        .await?;

        let mut stats = RebuildStats::default();
        for marker in batch {
            if cancel.is_cancelled() {
                debug!("rebuild cancelled mid-batch");
                break;
            }
            stats.processed += 1;
            self.process_marker(&marker, &mut stats).await;
        }

        Ok(stats)
    }

    /// Runs batches until no markers remain in scope, progress stalls
    /// (every remaining marker is failing), or cancellation.
    pub async fn run_to_completion(
        &self,
        scope: Scope<'_>,
        cancel: &CancellationToken,
    ) -> Result<RebuildStats, StoreError> {
        let mut total = RebuildStats::default();
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let pass = self.run_batch(scope, cancel).await?;
            let stalled = pass.processed > 0 && !pass.made_progress();
            total.merge(pass);

            let remaining = with_retry("dirty_count", &self.retry, || {
                self.store.dirty_count(scope)
            })
            .await?;
            if remaining == 0 || stalled {
                if stalled {
                    error!(remaining, "rebuild stalled, leaving markers for a later run");
                }
                break;
            }
        }

        info!(
            built = total.built,
            skipped = total.skipped_no_children,
            failed = total.failed,
            "rebuild pass finished"
        );
        Ok(total)
    }

    async fn process_marker(&self, marker: &DirtyMarker, stats: &mut RebuildStats) {
        // Children are looked up by their four keys, never by scanning
        // the tile table.
        let has_children = match self.any_child_exists(marker).await {
            Ok(exists) => exists,
            Err(e) => {
                error!(coord = %marker.coord, error = %e, "child lookup failed, marker kept");
                stats.failed += 1;
                return;
            }
        };

        if !has_children {
            // Nothing to build; the marker is satisfied by absence.
            match with_retry("delete_dirty", &self.retry, || {
                self.store.delete_dirty(marker)
            })
            .await
            {
                Ok(()) => stats.skipped_no_children += 1,
                Err(e) => {
                    error!(coord = %marker.coord, error = %e, "marker delete failed");
                    stats.failed += 1;
                }
            }
            return;
        }

        match self
            .builder
            .build_parent(&marker.tenant, marker.map_id, marker.coord)
            .await
        {
            Ok(record) => {
                debug!(
                    tenant = %marker.tenant,
                    coord = %marker.coord,
                    version = record.version,
                    "dirty tile rebuilt"
                );
                match with_retry("delete_dirty", &self.retry, || {
                    self.store.delete_dirty(marker)
                })
                .await
                {
                    Ok(()) => stats.built += 1,
                    Err(e) => {
                        error!(coord = %marker.coord, error = %e, "marker delete failed");
                        stats.failed += 1;
                    }
                }
            }
            Err(e) => {
                error!(
                    tenant = %marker.tenant,
                    coord = %marker.coord,
                    error = %e,
                    "tile rebuild failed, marker kept"
                );
                stats.failed += 1;
            }
        }
    }

    async fn any_child_exists(&self, marker: &DirtyMarker) -> Result<bool, StoreError> {
        for child in marker.coord.children() {
            let key = TileKey {
                tenant: marker.tenant.clone(),
                map_id: marker.map_id,
                coord: child,
            };
            let record =
                with_retry("get_tile", &self.retry, || self.store.get_tile(&key)).await?;
            if record.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
