//! End-to-end import workflow tests against the public API.

use hearthmap::coord::TileCoord;
use hearthmap::import::{ImportConfig, ImportMode, Importer, SessionService};
use hearthmap::storage::{check_quota, BlobStorage};
use hearthmap::store::{Datastore, MemoryStore, Scope, TenantRecord, TileKey};
use hearthmap::texture::{FetchError, FetcherConfig, TextureFetcher, TextureSource};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const GRID_CELLS: usize = 100 * 100;

/// Encodes a well-formed hmap export stream.
struct Export {
    tilesets: Vec<String>,
    segments: Vec<(u64, Vec<(String, i32, i32, u16)>)>,
}

impl Export {
    fn new(tilesets: &[&str]) -> Self {
        Self {
            tilesets: tilesets.iter().map(|s| s.to_string()).collect(),
            segments: Vec::new(),
        }
    }

    fn segment(mut self, id: u64, grids: &[(&str, i32, i32, u16)]) -> Self {
        self.segments.push((
            id,
            grids
                .iter()
                .map(|(gid, x, y, tile)| (gid.to_string(), *x, *y, *tile))
                .collect(),
        ));
        self
    }

    fn build(self) -> Vec<u8> {
        fn push_string(out: &mut Vec<u8>, s: &str) {
            out.extend_from_slice(&(s.len() as u16).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"HNHMAPX1");
        out.extend_from_slice(&(self.tilesets.len() as u16).to_le_bytes());
        for name in &self.tilesets {
            push_string(&mut out, name);
        }
        out.extend_from_slice(&(self.segments.len() as u32).to_le_bytes());
        for (id, grids) in &self.segments {
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&(grids.len() as u32).to_le_bytes());
            for (grid_id, x, y, tile) in grids {
                push_string(&mut out, grid_id);
                out.extend_from_slice(&x.to_le_bytes());
                out.extend_from_slice(&y.to_le_bytes());
                out.push(0); // no heights
                for _ in 0..GRID_CELLS {
                    out.extend_from_slice(&tile.to_le_bytes());
                }
                out.extend_from_slice(&0u32.to_le_bytes()); // no extra data
            }
        }
        out.extend_from_slice(&0u32.to_le_bytes()); // no markers
        out
    }
}

/// Texture source serving canned PNG responses.
#[derive(Clone, Default)]
struct CannedSource {
    responses: HashMap<String, Vec<u8>>,
}

impl CannedSource {
    fn with_texture(mut self, name: &str, rgba: [u8; 4]) -> Self {
        let img = RgbaImage::from_pixel(8, 8, Rgba(rgba));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        self.responses.insert(name.to_string(), buffer);
        self
    }
}

impl TextureSource for CannedSource {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, FetchError> {
        self.responses
            .get(name)
            .cloned()
            .ok_or_else(|| FetchError::Http {
                name: name.to_string(),
                message: "unavailable".to_string(),
            })
    }
}

struct World {
    store: Arc<MemoryStore>,
    blob: BlobStorage,
    importer: Importer<MemoryStore, CannedSource>,
    _dir: tempfile::TempDir,
}

async fn world(source: CannedSource, quota_mb: u64) -> World {
    let dir = tempfile::tempdir().unwrap();
    let blob = BlobStorage::new(dir.path());
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_tenant(TenantRecord::new("t1", quota_mb))
        .await
        .unwrap();

    let fetcher = Arc::new(TextureFetcher::new(source, FetcherConfig::default()));
    let importer = Importer::new(
        Arc::clone(&store),
        blob.clone(),
        fetcher,
        SessionService::with_cooldown(Duration::ZERO),
        ImportConfig::default(),
    );

    World {
        store,
        blob,
        importer,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_create_new_import_builds_full_pyramid() {
    let source = CannedSource::default().with_texture("gfx/tiles/grass", [40, 170, 60, 255]);
    let w = world(source, 100).await;

    let bytes = Export::new(&["gfx/tiles/grass"])
        .segment(
            7,
            &[
                ("g00", 0, 0, 0),
                ("g10", 1, 0, 0),
                ("g01", 0, 1, 0),
                ("g11", 1, 1, 0),
            ],
        )
        .build();

    let result = w
        .importer
        .import(&bytes, "t1", ImportMode::CreateNew, None, CancellationToken::new())
        .await;

    assert!(result.success, "{:?}", result.message);
    assert_eq!(result.maps_created, 1);
    assert_eq!(result.grids_imported, 4);
    assert_eq!(result.created_grid_ids.len(), 4);

    let map_id = result.created_map_ids[0];

    // Base tiles exist on disk under the documented layout.
    for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        let rel = format!("tenants/t1/{map_id}/0/{x}_{y}.png");
        assert!(w.blob.exists(&rel).await, "missing {rel}");
    }

    // The zoom-1 parent aggregates all four bases: fully opaque and
    // texture-colored in every quadrant.
    let parent_bytes = w
        .blob
        .read(&format!("tenants/t1/{map_id}/1/0_0.png"))
        .await
        .unwrap()
        .expect("zoom-1 tile file");
    let parent = image::load_from_memory(&parent_bytes).unwrap().to_rgba8();
    assert_eq!(parent.dimensions(), (100, 100));
    for (px, py) in [(10, 10), (90, 10), (10, 90), (90, 90)] {
        assert_eq!(*parent.get_pixel(px, py), Rgba([40, 170, 60, 255]));
    }

    // Zoom 2..6 ancestors exist; each holds the previous level in one
    // quadrant and transparent elsewhere.
    for zoom in 2..=6u8 {
        let rel = format!("tenants/t1/{map_id}/{zoom}/0_0.png");
        assert!(w.blob.exists(&rel).await, "missing {rel}");
    }

    // Rebuild converged: nothing dirty remains.
    assert_eq!(w.store.dirty_count(Scope::Tenant("t1")).await.unwrap(), 0);

    // Usage matches the tile rows exactly.
    let recorded: u64 = w
        .store
        .tiles_for_map("t1", map_id)
        .await
        .unwrap()
        .iter()
        .map(|t| t.size_bytes)
        .sum();
    let tenant = w.store.get_tenant("t1").await.unwrap().unwrap();
    assert_eq!(tenant.usage_bytes, recorded);
}

#[tokio::test]
async fn test_import_then_merge_extends_same_map() {
    let source = CannedSource::default().with_texture("gfx/tiles/grass", [40, 170, 60, 255]);
    let w = world(source, 100).await;

    let first = Export::new(&["gfx/tiles/grass"])
        .segment(1, &[("a", 0, 0, 0)])
        .build();
    let result1 = w
        .importer
        .import(&first, "t1", ImportMode::CreateNew, None, CancellationToken::new())
        .await;
    assert!(result1.success);

    let second = Export::new(&["gfx/tiles/grass"])
        .segment(1, &[("a", 0, 0, 0), ("b", 1, 0, 0)])
        .build();
    let result2 = w
        .importer
        .import(&second, "t1", ImportMode::Merge, None, CancellationToken::new())
        .await;

    assert!(result2.success, "{:?}", result2.message);
    assert_eq!(result2.maps_created, 0);
    assert_eq!(result2.grids_skipped, 1);
    assert_eq!(result2.grids_imported, 1);
    assert_eq!(result2.affected_map_ids, result1.created_map_ids);
    assert!(result2.created_map_ids.is_empty());

    // The new grid landed in the first run's map, and its zoom-1
    // parent was rebuilt to cover both bases.
    let map_id = result1.created_map_ids[0];
    let grid = w.store.find_grid("t1", "b").await.unwrap().unwrap();
    assert_eq!(grid.map_id, map_id);

    let key = TileKey {
        tenant: "t1".into(),
        map_id,
        coord: TileCoord::new(0, 0, 1),
    };
    let parent = w.store.get_tile(&key).await.unwrap().unwrap();
    assert_eq!(parent.version, 2, "zoom-1 tile rebuilt after merge");
}

#[tokio::test]
async fn test_quota_example_rejects_write_and_preserves_usage() {
    // Quota 10 MB, usage 9.9 MB, incoming ~0.2 MB.
    let mut tenant = TenantRecord::new("t1", 10);
    tenant.usage_bytes = (9.9 * 1024.0 * 1024.0) as u64;
    let before = tenant.usage_bytes;

    let incoming = (0.2 * 1024.0 * 1024.0) as u64;
    assert!(check_quota(&tenant, incoming).is_err());
    assert_eq!(tenant.usage_bytes, before, "usage unchanged on rejection");
}

#[tokio::test]
async fn test_over_quota_import_degrades_per_grid() {
    let source = CannedSource::default().with_texture("gfx/tiles/grass", [40, 170, 60, 255]);
    let w = world(source, 0).await; // zero quota: every tile write rejected

    let bytes = Export::new(&["gfx/tiles/grass"])
        .segment(1, &[("a", 0, 0, 0)])
        .build();
    let result = w
        .importer
        .import(&bytes, "t1", ImportMode::CreateNew, None, CancellationToken::new())
        .await;

    // Per-grid quota rejections are isolated: the run completes with
    // nothing imported and usage untouched.
    assert!(result.success);
    assert_eq!(result.grids_imported, 0);
    assert_eq!(result.tiles_written, 0);
    assert_eq!(
        w.store.get_tenant("t1").await.unwrap().unwrap().usage_bytes,
        0
    );
}

#[tokio::test]
async fn test_import_during_cooldown_rejected_with_wait() {
    let source = CannedSource::default().with_texture("gfx/tiles/grass", [40, 170, 60, 255]);
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_tenant(TenantRecord::new("t1", 100))
        .await
        .unwrap();

    let sessions = SessionService::with_cooldown(Duration::from_secs(300));
    let fetcher = Arc::new(TextureFetcher::new(source, FetcherConfig::default()));
    let importer = Importer::new(
        Arc::clone(&store),
        BlobStorage::new(dir.path()),
        fetcher,
        Arc::clone(&sessions),
        ImportConfig::default(),
    );

    let bytes = Export::new(&["gfx/tiles/grass"])
        .segment(1, &[("a", 0, 0, 0)])
        .build();

    // First import completes, entering the cooldown window.
    let first = importer
        .import(&bytes, "t1", ImportMode::CreateNew, None, CancellationToken::new())
        .await;
    assert!(first.success);

    // An attempt during cooldown is rejected with the remaining wait.
    let second = importer
        .import(&bytes, "t1", ImportMode::Merge, None, CancellationToken::new())
        .await;
    assert!(!second.success);
    assert!(second.message.unwrap().contains("cooldown"));
}
