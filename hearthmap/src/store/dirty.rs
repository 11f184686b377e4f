//! Dirty-marker propagation for base tile writes.

use super::error::StoreError;
use super::retry::{with_retry, RetryConfig};
use super::traits::Datastore;
use super::types::{DirtyMarker, MapId};
use crate::coord::TileCoord;
use tracing::trace;

/// Marks every ancestor of a freshly written base tile dirty.
///
/// Invariant: a zoom-0 write dirties all six ancestor coordinates
/// (zoom 1..=6) for its tenant and map. The insert is idempotent, so
/// parallel uploads marking the same ancestors collapse to one marker
/// per key.
pub async fn mark_ancestors_dirty<S: Datastore>(
    store: &S,
    retry: &RetryConfig,
    tenant: &str,
    map_id: MapId,
    base: TileCoord,
) -> Result<(), StoreError> {
    for ancestor in base.ancestors() {
        let marker = DirtyMarker {
            tenant: tenant.to_string(),
            map_id,
            coord: ancestor,
        };
        with_retry("mark_dirty", retry, || store.mark_dirty(marker.clone())).await?;
        trace!(tenant, map_id, coord = %ancestor, "ancestor marked dirty");
    }
    Ok(())
}
