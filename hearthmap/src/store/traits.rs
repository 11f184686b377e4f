//! Datastore trait definition for dependency injection.
//!
//! The embedded relational store behind the web application is not part
//! of this crate; components depend on this contract so tests and the
//! CLI can run against [`crate::store::MemoryStore`] while the server
//! binds its own backend.

use super::error::StoreError;
use super::types::{
    DirtyMarker, GridRecord, MapId, MapRecord, MarkerRecord, Scope, TenantRecord, TileKey,
    TileRecord,
};
use std::future::Future;

/// Contract over the Tenant, Map, Grid, Tile and DirtyTileMarker tables.
///
/// Uniqueness keys: grids by (id, tenant); tiles by (map, x, y, zoom,
/// tenant); dirty markers by (tenant, map, x, y, zoom) with idempotent
/// insert. Write methods may report [`StoreError::Contention`] while the
/// store's file lock is held; callers wrap them in
/// [`crate::store::with_retry`].
pub trait Datastore: Send + Sync {
    // -- tenants ---------------------------------------------------------

    fn get_tenant(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<TenantRecord>, StoreError>> + Send;

    fn upsert_tenant(
        &self,
        tenant: TenantRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Adjusts a tenant's usage counter by a signed byte delta,
    /// saturating at zero.
    fn adjust_usage(
        &self,
        tenant: &str,
        delta_bytes: i64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    // -- maps ------------------------------------------------------------

    fn create_map(
        &self,
        tenant: &str,
        name: &str,
    ) -> impl Future<Output = Result<MapRecord, StoreError>> + Send;

    fn delete_map(
        &self,
        tenant: &str,
        map_id: MapId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    // -- grids -----------------------------------------------------------

    fn insert_grid(
        &self,
        grid: GridRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn find_grid(
        &self,
        tenant: &str,
        grid_id: &str,
    ) -> impl Future<Output = Result<Option<GridRecord>, StoreError>> + Send;

    fn delete_grid(
        &self,
        tenant: &str,
        grid_id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    // -- tiles -----------------------------------------------------------

    /// Inserts or replaces a tile row, returning the replaced row.
    fn upsert_tile(
        &self,
        tile: TileRecord,
    ) -> impl Future<Output = Result<Option<TileRecord>, StoreError>> + Send;

    fn get_tile(
        &self,
        key: &TileKey,
    ) -> impl Future<Output = Result<Option<TileRecord>, StoreError>> + Send;

    fn tiles_for_map(
        &self,
        tenant: &str,
        map_id: MapId,
    ) -> impl Future<Output = Result<Vec<TileRecord>, StoreError>> + Send;

    fn delete_tile(
        &self,
        key: &TileKey,
    ) -> impl Future<Output = Result<Option<TileRecord>, StoreError>> + Send;

    // -- dirty markers ---------------------------------------------------

    /// Idempotent insert: marking an already-dirty key is a no-op, and
    /// concurrent duplicate marks collapse to one row.
    fn mark_dirty(
        &self,
        marker: DirtyMarker,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns up to `limit` markers ordered by ascending zoom, then
    /// map, then coordinate. Markers are not removed; callers delete
    /// them explicitly after a successful rebuild.
    fn dirty_batch(
        &self,
        scope: Scope<'_>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<DirtyMarker>, StoreError>> + Send;

    fn delete_dirty(
        &self,
        marker: &DirtyMarker,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn dirty_count(
        &self,
        scope: Scope<'_>,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    // -- markers ---------------------------------------------------------

    fn insert_marker(
        &self,
        marker: MarkerRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete_markers_for_map(
        &self,
        tenant: &str,
        map_id: MapId,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;
}
