//! Deterministic storage-relative paths.

use crate::coord::TileCoord;
use crate::store::MapId;

/// Root directory of one tenant's blobs, relative to the storage root.
pub fn tenant_root(tenant: &str) -> String {
    format!("tenants/{tenant}")
}

/// Storage-relative path of a rendered tile.
pub fn tile_rel_path(tenant: &str, map_id: MapId, coord: TileCoord) -> String {
    format!(
        "tenants/{tenant}/{map_id}/{}/{}.png",
        coord.zoom,
        coord.file_stem()
    )
}

/// Storage-relative path of a tenant's usage summary.
pub fn summary_rel_path(tenant: &str) -> String {
    format!("tenants/{tenant}/.storage.json")
}
