//! Parent tile construction.
//!
//! One parent tile at zoom `z` aggregates its four children at zoom
//! `z-1`: each found child is scaled to 50×50 with a 2×2 box filter and
//! composited into its quadrant of a transparent 100×100 canvas. Child
//! loads fan out concurrently; compositing onto the shared canvas is
//! serialized after the fan-in.

use super::arena::TileArena;
use super::error::PyramidError;
use crate::coord::{TileCoord, MAX_ZOOM};
use crate::storage::{check_quota, tile_rel_path, BlobStorage};
use crate::store::{
    mark_ancestors_dirty, with_retry, Datastore, MapId, RetryConfig, TileKey, TileRecord,
};
use image::RgbaImage;
use std::io::Cursor;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Rendered tile side in pixels.
const TILE_SIZE: u32 = 100;

/// Child tile size after scaling into its quadrant.
const HALF_SIZE: u32 = TILE_SIZE / 2;

/// Builds and persists pyramid tiles.
pub struct PyramidBuilder<S: Datastore> {
    store: Arc<S>,
    blob: BlobStorage,
    arena: Arc<TileArena>,
    retry: RetryConfig,
}

impl<S: Datastore + 'static> PyramidBuilder<S> {
    pub fn new(store: Arc<S>, blob: BlobStorage, retry: RetryConfig) -> Self {
        Self {
            store,
            blob,
            arena: Arc::new(TileArena::new()),
            retry,
        }
    }

    /// The in-run tile arena shared by cascading builds.
    pub fn arena(&self) -> &Arc<TileArena> {
        &self.arena
    }

    /// Persists a freshly rasterized base tile.
    ///
    /// Writes the blob and tile row, charges the tenant's usage,
    /// registers the image in the arena for the zoom-1 build, and marks
    /// all six ancestors dirty.
    pub async fn persist_base_tile(
        &self,
        tenant: &str,
        map_id: MapId,
        coord: TileCoord,
        image: Arc<RgbaImage>,
    ) -> Result<TileRecord, PyramidError> {
        let record = self.persist_tile(tenant, map_id, coord, &image).await?;

        self.arena.add(
            TileKey {
                tenant: tenant.to_string(),
                map_id,
                coord,
            },
            image,
            1,
        );
        mark_ancestors_dirty(self.store.as_ref(), &self.retry, tenant, map_id, coord).await?;

        Ok(record)
    }

    /// Builds the tile at `coord` (zoom ≥ 1) from its four children.
    ///
    /// Any subset of children may be absent; zero present children still
    /// produce an all-transparent tile, logged as an anomaly rather than
    /// failed. On success the children consumed from the arena are
    /// released; on failure they stay retained for the retry that the
    /// surviving dirty marker will drive.
    pub async fn build_parent(
        &self,
        tenant: &str,
        map_id: MapId,
        coord: TileCoord,
    ) -> Result<TileRecord, PyramidError> {
        let children = coord.children();

        // Fan out the four child loads; results land in a fixed slice
        // indexed by quadrant.
        let mut tasks = JoinSet::new();
        for (slot, child) in children.into_iter().enumerate() {
            let key = TileKey {
                tenant: tenant.to_string(),
                map_id,
                coord: child,
            };
            let store = Arc::clone(&self.store);
            let blob = self.blob.clone();
            let arena = Arc::clone(&self.arena);
            let retry = self.retry.clone();
            tasks.spawn(async move {
                let loaded = load_child(store.as_ref(), &blob, &arena, &retry, &key).await;
                (slot, loaded)
            });
        }

        let mut loaded: [Option<(Arc<RgbaImage>, bool)>; 4] = [None, None, None, None];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, child)) => loaded[slot] = child,
                Err(join_err) => {
                    warn!(error = %join_err, "child load task panicked");
                }
            }
        }

        // Serialized compositing onto the shared canvas.
        let mut canvas = RgbaImage::new(TILE_SIZE, TILE_SIZE);
        let mut found = 0usize;
        for (slot, child) in loaded.iter().enumerate() {
            if let Some((image, _)) = child {
                let scaled = downscale_half(image);
                let x_offset = (slot as u32 % 2) * HALF_SIZE;
                let y_offset = (slot as u32 / 2) * HALF_SIZE;
                place_quadrant(&mut canvas, &scaled, x_offset, y_offset);
                found += 1;
            }
        }

        if found == 0 {
            warn!(tenant, map_id, coord = %coord, "no children present, producing transparent tile");
        } else {
            debug!(tenant, map_id, coord = %coord, children = found, "parent tile composited");
        }

        let record = self.persist_tile(tenant, map_id, coord, &canvas).await?;

        // Consume the arena references only after the tile is durable.
        for (slot, child) in loaded.iter().enumerate() {
            if matches!(child, Some((_, true))) {
                self.arena.release(&TileKey {
                    tenant: tenant.to_string(),
                    map_id,
                    coord: children[slot],
                });
            }
        }

        // Register for the next level up, which consumes this tile.
        if coord.zoom < MAX_ZOOM {
            self.arena.add(
                TileKey {
                    tenant: tenant.to_string(),
                    map_id,
                    coord,
                },
                Arc::new(canvas),
                1,
            );
        }

        Ok(record)
    }

    /// Encodes, quota-checks, writes and records one tile, keeping the
    /// tenant's usage counter in step. When a prior version of the tile
    /// existed its size is subtracted after the new size is added, so a
    /// rewrite is never double counted.
    pub async fn persist_tile(
        &self,
        tenant: &str,
        map_id: MapId,
        coord: TileCoord,
        image: &RgbaImage,
    ) -> Result<TileRecord, PyramidError> {
        let bytes = encode_png(image)?;

        let tenant_record =
            with_retry("get_tenant", &self.retry, || self.store.get_tenant(tenant))
                .await?
                .ok_or_else(|| PyramidError::UnknownTenant(tenant.to_string()))?;
        check_quota(&tenant_record, bytes.len() as u64)?;

        let rel_path = tile_rel_path(tenant, map_id, coord);
        let size_bytes = self.blob.write(&rel_path, &bytes).await?;

        let key = TileKey {
            tenant: tenant.to_string(),
            map_id,
            coord,
        };
        let previous = with_retry("get_tile", &self.retry, || self.store.get_tile(&key)).await?;

        let record = TileRecord {
            tenant: tenant.to_string(),
            map_id,
            coord,
            path: rel_path,
            version: previous.as_ref().map(|t| t.version + 1).unwrap_or(1),
            size_bytes,
        };
        with_retry("upsert_tile", &self.retry, || {
            self.store.upsert_tile(record.clone())
        })
        .await?;

        with_retry("adjust_usage", &self.retry, || {
            self.store.adjust_usage(tenant, size_bytes as i64)
        })
        .await?;
        if let Some(previous) = &previous {
            with_retry("adjust_usage", &self.retry, || {
                self.store.adjust_usage(tenant, -(previous.size_bytes as i64))
            })
            .await?;
        }

        Ok(record)
    }
}

/// Loads one child tile: arena first, then tile row + blob.
///
/// Returns the image and whether it came from the arena (and thus holds
/// a reference the builder must release after consuming it).
async fn load_child<S: Datastore>(
    store: &S,
    blob: &BlobStorage,
    arena: &TileArena,
    retry: &RetryConfig,
    key: &TileKey,
) -> Option<(Arc<RgbaImage>, bool)> {
    if let Some(image) = arena.get(key) {
        return Some((image, true));
    }

    let record = match with_retry("get_tile", retry, || store.get_tile(key)).await {
        Ok(record) => record?,
        Err(e) => {
            warn!(coord = %key.coord, error = %e, "child tile row lookup failed");
            return None;
        }
    };

    let bytes = match blob.read(&record.path).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            warn!(coord = %key.coord, path = %record.path, "child tile file missing");
            return None;
        }
        Err(e) => {
            warn!(coord = %key.coord, error = %e, "child tile read failed");
            return None;
        }
    };

    match image::load_from_memory(&bytes) {
        Ok(image) => Some((Arc::new(image.to_rgba8()), false)),
        Err(e) => {
            warn!(coord = %key.coord, error = %e, "child tile decode failed");
            None
        }
    }
}

/// Downscales a tile to half size with a 2×2 box filter.
fn downscale_half(source: &RgbaImage) -> RgbaImage {
    let new_width = (source.width() / 2).max(1);
    let new_height = (source.height() / 2).max(1);
    let mut output = RgbaImage::new(new_width, new_height);

    for y in 0..new_height {
        for x in 0..new_width {
            let p00 = source.get_pixel(x * 2, y * 2);
            let p10 = source.get_pixel(x * 2 + 1, y * 2);
            let p01 = source.get_pixel(x * 2, y * 2 + 1);
            let p11 = source.get_pixel(x * 2 + 1, y * 2 + 1);

            let avg = image::Rgba([
                ((p00[0] as u16 + p10[0] as u16 + p01[0] as u16 + p11[0] as u16) / 4) as u8,
                ((p00[1] as u16 + p10[1] as u16 + p01[1] as u16 + p11[1] as u16) / 4) as u8,
                ((p00[2] as u16 + p10[2] as u16 + p01[2] as u16 + p11[2] as u16) / 4) as u8,
                ((p00[3] as u16 + p10[3] as u16 + p01[3] as u16 + p11[3] as u16) / 4) as u8,
            ]);
            output.put_pixel(x, y, avg);
        }
    }

    output
}

/// Places a scaled child into its quadrant of the parent canvas.
fn place_quadrant(canvas: &mut RgbaImage, child: &RgbaImage, x_offset: u32, y_offset: u32) {
    let width = child.width().min(HALF_SIZE);
    let height = child.height().min(HALF_SIZE);
    for y in 0..height {
        for x in 0..width {
            canvas.put_pixel(x_offset + x, y_offset + y, *child.get_pixel(x, y));
        }
    }
}

/// Encodes a canvas as PNG bytes.
fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, PyramidError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| PyramidError::Encode(e.to_string()))?;
    Ok(bytes)
}
