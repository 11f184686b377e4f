//! In-memory datastore implementation.
//!
//! Backs tests and the CLI. Mirrors the embedded store's behavior under
//! contention: every write takes the whole-store lock via `try_lock`, so
//! a concurrently held lock surfaces as [`StoreError::Contention`]
//! exactly like the real backend's file lock, and callers exercise the
//! same retry paths.

use super::error::StoreError;
use super::traits::Datastore;
use super::types::{
    DirtyMarker, GridRecord, MapId, MapRecord, MarkerRecord, Scope, TenantRecord, TileKey,
    TileRecord,
};
use crate::coord::TileCoord;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, TryLockError};

/// Ordering key for dirty markers: zoom ascending first so a level's
/// prerequisites rebuild before the level itself, then map, then
/// coordinate.
type DirtyKey = (u8, MapId, i32, i32, String);

fn dirty_key(marker: &DirtyMarker) -> DirtyKey {
    (
        marker.coord.zoom,
        marker.map_id,
        marker.coord.y,
        marker.coord.x,
        marker.tenant.clone(),
    )
}

fn dirty_from_key(key: &DirtyKey) -> DirtyMarker {
    DirtyMarker {
        tenant: key.4.clone(),
        map_id: key.1,
        coord: TileCoord::new(key.3, key.2, key.0),
    }
}

#[derive(Default)]
struct Inner {
    tenants: HashMap<String, TenantRecord>,
    maps: HashMap<MapId, MapRecord>,
    next_map_id: MapId,
    grids: HashMap<(String, String), GridRecord>,
    tiles: HashMap<TileKey, TileRecord>,
    dirty: BTreeSet<DirtyKey>,
    markers: Vec<MarkerRecord>,
}

/// In-memory store over a single whole-store lock.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, op: &'static str) -> Result<MutexGuard<'_, Inner>, StoreError> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(StoreError::Contention { op }),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }
}

impl Datastore for MemoryStore {
    async fn get_tenant(&self, id: &str) -> Result<Option<TenantRecord>, StoreError> {
        Ok(self.lock("get_tenant")?.tenants.get(id).cloned())
    }

    async fn upsert_tenant(&self, tenant: TenantRecord) -> Result<(), StoreError> {
        self.lock("upsert_tenant")?
            .tenants
            .insert(tenant.id.clone(), tenant);
        Ok(())
    }

    async fn adjust_usage(&self, tenant: &str, delta_bytes: i64) -> Result<(), StoreError> {
        let mut inner = self.lock("adjust_usage")?;
        let record = inner
            .tenants
            .get_mut(tenant)
            .ok_or_else(|| StoreError::UnknownTenant(tenant.to_string()))?;
        record.usage_bytes = if delta_bytes >= 0 {
            record.usage_bytes.saturating_add(delta_bytes as u64)
        } else {
            record.usage_bytes.saturating_sub(delta_bytes.unsigned_abs())
        };
        Ok(())
    }

    async fn create_map(&self, tenant: &str, name: &str) -> Result<MapRecord, StoreError> {
        let mut inner = self.lock("create_map")?;
        if !inner.tenants.contains_key(tenant) {
            return Err(StoreError::UnknownTenant(tenant.to_string()));
        }
        inner.next_map_id += 1;
        let map = MapRecord {
            id: inner.next_map_id,
            tenant: tenant.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        inner.maps.insert(map.id, map.clone());
        Ok(map)
    }

    async fn delete_map(&self, tenant: &str, map_id: MapId) -> Result<(), StoreError> {
        let mut inner = self.lock("delete_map")?;
        if let Some(map) = inner.maps.get(&map_id) {
            if map.tenant != tenant {
                return Err(StoreError::ScopeViolation {
                    scope: tenant.to_string(),
                    row: map.tenant.clone(),
                });
            }
            inner.maps.remove(&map_id);
        }
        Ok(())
    }

    async fn insert_grid(&self, grid: GridRecord) -> Result<(), StoreError> {
        let mut inner = self.lock("insert_grid")?;
        let key = (grid.tenant.clone(), grid.id.clone());
        if inner.grids.contains_key(&key) {
            return Err(StoreError::Duplicate {
                what: "grid",
                key: grid.id,
                tenant: grid.tenant,
            });
        }
        inner.grids.insert(key, grid);
        Ok(())
    }

    async fn find_grid(
        &self,
        tenant: &str,
        grid_id: &str,
    ) -> Result<Option<GridRecord>, StoreError> {
        Ok(self
            .lock("find_grid")?
            .grids
            .get(&(tenant.to_string(), grid_id.to_string()))
            .cloned())
    }

    async fn delete_grid(&self, tenant: &str, grid_id: &str) -> Result<(), StoreError> {
        self.lock("delete_grid")?
            .grids
            .remove(&(tenant.to_string(), grid_id.to_string()));
        Ok(())
    }

    async fn upsert_tile(&self, tile: TileRecord) -> Result<Option<TileRecord>, StoreError> {
        let mut inner = self.lock("upsert_tile")?;
        Ok(inner.tiles.insert(tile.key(), tile))
    }

    async fn get_tile(&self, key: &TileKey) -> Result<Option<TileRecord>, StoreError> {
        Ok(self.lock("get_tile")?.tiles.get(key).cloned())
    }

    async fn tiles_for_map(
        &self,
        tenant: &str,
        map_id: MapId,
    ) -> Result<Vec<TileRecord>, StoreError> {
        Ok(self
            .lock("tiles_for_map")?
            .tiles
            .values()
            .filter(|t| t.tenant == tenant && t.map_id == map_id)
            .cloned()
            .collect())
    }

    async fn delete_tile(&self, key: &TileKey) -> Result<Option<TileRecord>, StoreError> {
        Ok(self.lock("delete_tile")?.tiles.remove(key))
    }

    async fn mark_dirty(&self, marker: DirtyMarker) -> Result<(), StoreError> {
        // BTreeSet insert is the idempotence: a duplicate key is absorbed.
        self.lock("mark_dirty")?.dirty.insert(dirty_key(&marker));
        Ok(())
    }

    async fn dirty_batch(
        &self,
        scope: Scope<'_>,
        limit: usize,
    ) -> Result<Vec<DirtyMarker>, StoreError> {
        Ok(self
            .lock("dirty_batch")?
            .dirty
            .iter()
            .filter(|key| scope.admits(&key.4))
            .take(limit)
            .map(dirty_from_key)
            .collect())
    }

    async fn delete_dirty(&self, marker: &DirtyMarker) -> Result<(), StoreError> {
        self.lock("delete_dirty")?.dirty.remove(&dirty_key(marker));
        Ok(())
    }

    async fn dirty_count(&self, scope: Scope<'_>) -> Result<usize, StoreError> {
        Ok(self
            .lock("dirty_count")?
            .dirty
            .iter()
            .filter(|key| scope.admits(&key.4))
            .count())
    }

    async fn insert_marker(&self, marker: MarkerRecord) -> Result<(), StoreError> {
        self.lock("insert_marker")?.markers.push(marker);
        Ok(())
    }

    async fn delete_markers_for_map(
        &self,
        tenant: &str,
        map_id: MapId,
    ) -> Result<usize, StoreError> {
        let mut inner = self.lock("delete_markers_for_map")?;
        let before = inner.markers.len();
        inner
            .markers
            .retain(|m| !(m.tenant == tenant && m.map_id == map_id));
        Ok(before - inner.markers.len())
    }
}
