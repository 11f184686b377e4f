//! Compensating cleanup for failed or cancelled imports.
//!
//! Best effort, not a transaction: each step logs and continues on
//! failure, nothing is retried beyond the store's contention budget,
//! and a partial cleanup leaves the remainder for operators.

use crate::storage::BlobStorage;
use crate::store::{with_retry, Datastore, MapId, RetryConfig, Scope};
use tracing::{info, warn};

/// Entities created by the current run, tracked for compensation.
#[derive(Debug, Default)]
pub struct CreatedEntities {
    pub maps: Vec<MapId>,
    pub grids: Vec<String>,
}

impl CreatedEntities {
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty() && self.grids.is_empty()
    }
}

/// What a cleanup pass managed to undo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub grids_deleted: usize,
    pub maps_deleted: usize,
    pub tiles_deleted: usize,
    pub bytes_reclaimed: u64,
    /// Steps that failed and were skipped, not retried.
    pub failures: usize,
}

/// Deletes the run's newly created grids and maps, removes their tile
/// rows and rendered files, and reverses the storage-quota increments.
pub async fn run_cleanup<S: Datastore>(
    store: &S,
    blob: &BlobStorage,
    retry: &RetryConfig,
    tenant: &str,
    created: &CreatedEntities,
) -> CleanupReport {
    let mut report = CleanupReport::default();

    for grid_id in &created.grids {
        match with_retry("delete_grid", retry, || store.delete_grid(tenant, grid_id)).await {
            Ok(()) => report.grids_deleted += 1,
            Err(e) => {
                warn!(tenant, grid_id, error = %e, "cleanup: grid delete failed");
                report.failures += 1;
            }
        }
    }

    for &map_id in &created.maps {
        cleanup_map(store, blob, retry, tenant, map_id, &mut report).await;
    }

    info!(
        tenant,
        grids = report.grids_deleted,
        maps = report.maps_deleted,
        tiles = report.tiles_deleted,
        bytes = report.bytes_reclaimed,
        failures = report.failures,
        "compensating cleanup finished"
    );

    report
}

async fn cleanup_map<S: Datastore>(
    store: &S,
    blob: &BlobStorage,
    retry: &RetryConfig,
    tenant: &str,
    map_id: MapId,
    report: &mut CleanupReport,
) {
    let tiles = match with_retry("tiles_for_map", retry, || {
        store.tiles_for_map(tenant, map_id)
    })
    .await
    {
        Ok(tiles) => tiles,
        Err(e) => {
            warn!(tenant, map_id, error = %e, "cleanup: tile listing failed, map skipped");
            report.failures += 1;
            return;
        }
    };

    for tile in tiles {
        if let Err(e) = blob.delete(&tile.path).await {
            warn!(path = %tile.path, error = %e, "cleanup: tile file delete failed");
            report.failures += 1;
        }
        let key = tile.key();
        match with_retry("delete_tile", retry, || store.delete_tile(&key)).await {
            Ok(_) => {
                report.tiles_deleted += 1;
                report.bytes_reclaimed += tile.size_bytes;
                // Reverse the usage increment this tile charged.
                if let Err(e) = with_retry("adjust_usage", retry, || {
                    store.adjust_usage(tenant, -(tile.size_bytes as i64))
                })
                .await
                {
                    warn!(tenant, error = %e, "cleanup: usage reversal failed");
                    report.failures += 1;
                }
            }
            Err(e) => {
                warn!(tenant, coord = %tile.coord, error = %e, "cleanup: tile row delete failed");
                report.failures += 1;
            }
        }
    }

    // Drop any dirty markers still pointing into the deleted map.
    if let Ok(markers) = store.dirty_batch(Scope::Tenant(tenant), usize::MAX).await {
        for marker in markers.iter().filter(|m| m.map_id == map_id) {
            if let Err(e) = with_retry("delete_dirty", retry, || store.delete_dirty(marker)).await
            {
                warn!(coord = %marker.coord, error = %e, "cleanup: marker delete failed");
                report.failures += 1;
            }
        }
    }

    if let Err(e) = with_retry("delete_markers_for_map", retry, || {
        store.delete_markers_for_map(tenant, map_id)
    })
    .await
    {
        warn!(tenant, map_id, error = %e, "cleanup: poi delete failed");
        report.failures += 1;
    }

    match with_retry("delete_map", retry, || store.delete_map(tenant, map_id)).await {
        Ok(()) => report.maps_deleted += 1,
        Err(e) => {
            warn!(tenant, map_id, error = %e, "cleanup: map delete failed");
            report.failures += 1;
        }
    }
}
