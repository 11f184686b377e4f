//! Persistent record types and their uniqueness keys.

use crate::coord::TileCoord;
use chrono::{DateTime, Utc};

/// Map identifier, allocated by the store.
pub type MapId = u64;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Access scope for background services versus request handling.
///
/// Background services (rebuild, reconciliation) see every tenant's
/// rows; request-scoped access filters to one tenant so a routing bug
/// cannot leak another tenant's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// No tenant filter - background-service access.
    Background,
    /// Rows of one tenant only.
    Tenant(&'a str),
}

impl Scope<'_> {
    /// Whether a row owned by `tenant` is visible in this scope.
    #[inline]
    pub fn admits(&self, tenant: &str) -> bool {
        match self {
            Scope::Background => true,
            Scope::Tenant(scoped) => *scoped == tenant,
        }
    }
}

/// An isolated customer account with a storage budget.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantRecord {
    pub id: String,
    /// Storage ceiling in bytes.
    pub quota_bytes: u64,
    /// Approximate current usage in bytes; reconciled periodically
    /// against actual file sizes.
    pub usage_bytes: u64,
    pub active: bool,
}

impl TenantRecord {
    /// Creates an active tenant with the given quota in megabytes.
    pub fn new(id: impl Into<String>, quota_mb: u64) -> Self {
        Self {
            id: id.into(),
            quota_bytes: quota_mb * BYTES_PER_MB as u64,
            usage_bytes: 0,
            active: true,
        }
    }

    /// Current usage in megabytes.
    pub fn usage_mb(&self) -> f64 {
        self.usage_bytes as f64 / BYTES_PER_MB
    }

    /// Whether an incoming write of `bytes` fits under the quota.
    pub fn has_capacity(&self, bytes: u64) -> bool {
        self.usage_bytes.saturating_add(bytes) <= self.quota_bytes
    }
}

/// One imported map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapRecord {
    pub id: MapId,
    pub tenant: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One 100×100 terrain grid. Identity is (id, tenant): grid ids are
/// content-derived and only unique within a tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct GridRecord {
    pub id: String,
    pub tenant: String,
    pub map_id: MapId,
    /// Position at zoom 0.
    pub coord: TileCoord,
    /// When this grid becomes eligible for re-fetch from a client.
    pub next_refetch: DateTime<Utc>,
}

/// Uniqueness key of a rendered tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub tenant: String,
    pub map_id: MapId,
    pub coord: TileCoord,
}

/// One rendered tile image at a (map, coordinate, zoom) triple.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRecord {
    pub tenant: String,
    pub map_id: MapId,
    pub coord: TileCoord,
    /// Path relative to the storage root.
    pub path: String,
    /// Cache-busting stamp, bumped on every rewrite.
    pub version: u64,
    pub size_bytes: u64,
}

impl TileRecord {
    pub fn key(&self) -> TileKey {
        TileKey {
            tenant: self.tenant.clone(),
            map_id: self.map_id,
            coord: self.coord,
        }
    }
}

/// Pending-rebuild flag for an ancestor tile. At most one live marker
/// exists per (tenant, map, x, y, zoom).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirtyMarker {
    pub tenant: String,
    pub map_id: MapId,
    pub coord: TileCoord,
}

/// A point of interest resolved to a grid-local position at import.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerRecord {
    pub tenant: String,
    pub map_id: MapId,
    pub grid_id: String,
    pub local_x: u8,
    pub local_y: u8,
    pub name: String,
    pub icon: String,
}
