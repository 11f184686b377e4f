//! The import entry point.
//!
//! Phases run strictly in sequence:
//! `Parse → SelectSegments → PrefetchTextures → ImportSegments →
//! GenerateZoomLevels → ImportMarkers → Complete`. A phase failure
//! aborts the run and triggers the compensating cleanup; per-grid and
//! per-marker failures inside a phase are isolated and logged. The
//! cancellation signal is checked between phases and between items.

use super::cleanup::{run_cleanup, CreatedEntities};
use super::config::{ImportConfig, ImportMode};
use super::error::ImportError;
use super::progress::{report, ImportPhase, ImportProgress, ProgressCallback};
use super::result::ImportResult;
use super::session::SessionService;
use crate::coord::TileCoord;
use crate::hmap::{self, GridData, MapDocument, MarkerData, Segment, GRID_SIDE};
use crate::pyramid::{PyramidBuilder, RebuildRunner};
use crate::render::render_grid;
use crate::storage::BlobStorage;
use crate::store::{
    with_retry, Datastore, GridRecord, MapId, MarkerRecord, Scope,
};
use crate::texture::{TextureFetcher, TextureSource};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Orchestrates full import runs against a datastore and blob storage.
pub struct Importer<S: Datastore, T: TextureSource> {
    store: Arc<S>,
    blob: BlobStorage,
    fetcher: Arc<TextureFetcher<T>>,
    sessions: Arc<SessionService>,
    config: ImportConfig,
}

/// Counters accumulated while a run progresses; turned into the public
/// result whether the run finishes or aborts.
#[derive(Default)]
struct RunState {
    maps_created: usize,
    grids_imported: usize,
    grids_skipped: usize,
    tiles_written: usize,
    markers_imported: usize,
    segments_dropped: usize,
    affected_maps: Vec<MapId>,
    created: CreatedEntities,
}

impl<S: Datastore + 'static, T: TextureSource + 'static> Importer<S, T> {
    pub fn new(
        store: Arc<S>,
        blob: BlobStorage,
        fetcher: Arc<TextureFetcher<T>>,
        sessions: Arc<SessionService>,
        config: ImportConfig,
    ) -> Self {
        Self {
            store,
            blob,
            fetcher,
            sessions,
            config,
        }
    }

    /// Runs one import. Never panics across this boundary and never
    /// returns an error: failures come back as a result with
    /// `success: false` and whatever partial counts were achieved.
    pub async fn import(
        &self,
        bytes: &[u8],
        tenant: &str,
        mode: ImportMode,
        progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> ImportResult {
        let started = Instant::now();

        let _session = match self.sessions.begin(tenant) {
            Ok(guard) => guard,
            Err(e) => {
                info!(tenant, reason = %e, "import rejected");
                return ImportResult::rejected(e.to_string());
            }
        };

        let mut state = RunState::default();
        let outcome = self
            .run(bytes, tenant, mode, &progress, &cancel, &mut state)
            .await;

        let mut result = ImportResult {
            maps_created: state.maps_created,
            grids_imported: state.grids_imported,
            grids_skipped: state.grids_skipped,
            tiles_written: state.tiles_written,
            markers_imported: state.markers_imported,
            segments_dropped: state.segments_dropped,
            affected_map_ids: state.affected_maps.clone(),
            created_map_ids: state.created.maps.clone(),
            created_grid_ids: state.created.grids.clone(),
            fetch_diagnostic: self.fetcher.first_error().map(|e| e.to_string()),
            duration: started.elapsed(),
            ..ImportResult::default()
        };

        match outcome {
            Ok(()) => {
                report(&progress, ImportProgress::at_phase(ImportPhase::Complete));
                result.success = true;
                info!(
                    tenant,
                    maps = result.maps_created,
                    grids = result.grids_imported,
                    skipped = result.grids_skipped,
                    tiles = result.tiles_written,
                    markers = result.markers_imported,
                    duration_ms = result.duration.as_millis() as u64,
                    "import complete"
                );
            }
            Err(e) => {
                error!(tenant, error = %e, "import aborted, compensating");
                let report = run_cleanup(
                    self.store.as_ref(),
                    &self.blob,
                    &self.config.retry,
                    tenant,
                    &state.created,
                )
                .await;
                if report.failures > 0 {
                    warn!(tenant, failures = report.failures, "cleanup was partial");
                }
                result.success = false;
                result.message = Some(e.to_string());
            }
        }

        result
    }

    async fn run(
        &self,
        bytes: &[u8],
        tenant: &str,
        mode: ImportMode,
        progress: &Option<ProgressCallback>,
        cancel: &CancellationToken,
        state: &mut RunState,
    ) -> Result<(), ImportError> {
        with_retry("get_tenant", &self.config.retry, || {
            self.store.get_tenant(tenant)
        })
        .await?
        .filter(|t| t.active)
        .ok_or_else(|| ImportError::BadTenant(tenant.to_string()))?;

        // Parse: fatal on any malformation, no partial documents.
        report(progress, ImportProgress::at_phase(ImportPhase::Parse));
        let doc = hmap::parse(bytes)?;
        check_cancel(cancel)?;

        // SelectSegments: keep the largest N, drop the rest with a
        // diagnostic.
        report(progress, ImportProgress::at_phase(ImportPhase::SelectSegments));
        let segments = doc.segments();
        let selected: Vec<Segment> = segments
            .iter()
            .take(self.config.max_segments)
            .cloned()
            .collect();
        state.segments_dropped = segments.len() - selected.len();
        if state.segments_dropped > 0 {
            info!(
                kept = selected.len(),
                dropped = state.segments_dropped,
                "segments below the retention cut dropped"
            );
        }
        check_cancel(cancel)?;

        // PrefetchTextures: warm the cache ahead of rasterization.
        report(progress, ImportProgress::at_phase(ImportPhase::PrefetchTextures));
        let grids_by_segment = doc.grids_by_segment();
        let names = texture_names(&doc, &selected, &grids_by_segment);
        let resolved = Arc::clone(&self.fetcher).prefetch(names, cancel).await;
        debug!(resolved, "texture prefetch finished");
        check_cancel(cancel)?;

        // ImportSegments: rasterize and persist base tiles. The builder
        // and its arena live exactly as long as this run.
        report(progress, ImportProgress::at_phase(ImportPhase::ImportSegments));
        let builder = Arc::new(PyramidBuilder::new(
            Arc::clone(&self.store),
            self.blob.clone(),
            self.config.retry.clone(),
        ));
        let mut segment_maps: HashMap<u64, MapId> = HashMap::new();
        let total_grids: usize = selected
            .iter()
            .map(|s| grids_by_segment.get(&s.id).map_or(0, Vec::len))
            .sum();
        let mut item = 0usize;

        for segment in &selected {
            check_cancel(cancel)?;
            let Some(grids) = grids_by_segment.get(&segment.id) else {
                continue;
            };

            let map_id = self.resolve_map(tenant, mode, segment, grids, state).await?;
            segment_maps.insert(segment.id, map_id);

            for &grid in grids.iter() {
                check_cancel(cancel)?;
                item += 1;
                report(
                    progress,
                    ImportProgress::at_item(ImportPhase::ImportSegments, item, total_grids, &grid.id),
                );

                let existing = with_retry("find_grid", &self.config.retry, || {
                    self.store.find_grid(tenant, &grid.id)
                })
                .await?;
                if existing.is_some() {
                    state.grids_skipped += 1;
                    continue;
                }

                // Per-grid isolation: one bad grid never sinks its
                // siblings.
                if let Err(e) = self
                    .import_grid(&doc, grid, tenant, map_id, &builder, state)
                    .await
                {
                    error!(grid = %grid.id, error = %e, "grid import failed, continuing");
                }
            }
        }

        // GenerateZoomLevels: drain this tenant's dirty markers, zoom
        // ascending.
        report(progress, ImportProgress::at_phase(ImportPhase::GenerateZoomLevels));
        let runner = RebuildRunner::new(
            Arc::clone(&self.store),
            Arc::clone(&builder),
            self.config.retry.clone(),
        )
        .with_batch_size(self.config.rebuild_batch_size);
        let rebuild = runner.run_to_completion(Scope::Tenant(tenant), cancel).await?;
        state.tiles_written += rebuild.built;
        check_cancel(cancel)?;

        // ImportMarkers: resolve world positions to grid-local ones.
        report(progress, ImportProgress::at_phase(ImportPhase::ImportMarkers));
        let markers_by_segment = doc.markers_by_segment();
        for segment in &selected {
            let Some(&map_id) = segment_maps.get(&segment.id) else {
                continue;
            };
            let Some(markers) = markers_by_segment.get(&segment.id) else {
                continue;
            };
            for (index, &marker) in markers.iter().enumerate() {
                check_cancel(cancel)?;
                report(
                    progress,
                    ImportProgress::at_item(
                        ImportPhase::ImportMarkers,
                        index + 1,
                        markers.len(),
                        &marker.name,
                    ),
                );
                if let Err(e) = self.import_marker(&doc, marker, tenant, map_id, state).await {
                    warn!(marker = %marker.name, error = %e, "marker import failed, continuing");
                }
            }
        }

        Ok(())
    }

    /// Picks or creates the map a segment imports into.
    async fn resolve_map(
        &self,
        tenant: &str,
        mode: ImportMode,
        segment: &Segment,
        grids: &[&GridData],
        state: &mut RunState,
    ) -> Result<MapId, ImportError> {
        if mode == ImportMode::Merge {
            for grid in grids {
                let existing = with_retry("find_grid", &self.config.retry, || {
                    self.store.find_grid(tenant, &grid.id)
                })
                .await?;
                if let Some(existing) = existing {
                    debug!(
                        segment = segment.id,
                        map_id = existing.map_id,
                        "merging into existing map"
                    );
                    state.affected_maps.push(existing.map_id);
                    return Ok(existing.map_id);
                }
            }
        }

        let name = format!("segment-{}", segment.id);
        let map = with_retry("create_map", &self.config.retry, || {
            self.store.create_map(tenant, &name)
        })
        .await?;
        state.maps_created += 1;
        state.affected_maps.push(map.id);
        state.created.maps.push(map.id);
        debug!(segment = segment.id, map_id = map.id, "created map");
        Ok(map.id)
    }

    async fn import_grid(
        &self,
        doc: &MapDocument,
        grid: &GridData,
        tenant: &str,
        map_id: MapId,
        builder: &PyramidBuilder<S>,
        state: &mut RunState,
    ) -> Result<(), ImportError> {
        let textures = self
            .fetcher
            .resolve_table(&doc.tilesets, &grid.used_tilesets())
            .await;
        let image = render_grid(&grid.tiles, grid.heights.as_deref(), &textures);

        builder
            .persist_base_tile(tenant, map_id, grid.coord, Arc::new(image))
            .await?;
        state.tiles_written += 1;

        let record = GridRecord {
            id: grid.id.clone(),
            tenant: tenant.to_string(),
            map_id,
            coord: grid.coord,
            next_refetch: chrono::Utc::now()
                + chrono::Duration::from_std(self.config.refetch_after)
                    .unwrap_or_else(|_| chrono::Duration::hours(1)),
        };
        with_retry("insert_grid", &self.config.retry, || {
            self.store.insert_grid(record.clone())
        })
        .await?;

        state.grids_imported += 1;
        state.created.grids.push(grid.id.clone());
        Ok(())
    }

    async fn import_marker(
        &self,
        doc: &MapDocument,
        marker: &MarkerData,
        tenant: &str,
        map_id: MapId,
        state: &mut RunState,
    ) -> Result<(), ImportError> {
        let side = GRID_SIDE as i32;
        let grid_coord = TileCoord::base(marker.x.div_euclid(side), marker.y.div_euclid(side));
        let local_x = marker.x.rem_euclid(side) as u8;
        let local_y = marker.y.rem_euclid(side) as u8;

        let Some(grid) = doc
            .grids
            .iter()
            .find(|g| g.segment == marker.segment && g.coord == grid_coord)
        else {
            debug!(marker = %marker.name, coord = %grid_coord, "marker outside imported grids, skipped");
            return Ok(());
        };

        let record = MarkerRecord {
            tenant: tenant.to_string(),
            map_id,
            grid_id: grid.id.clone(),
            local_x,
            local_y,
            name: marker.name.clone(),
            icon: marker.icon.clone(),
        };
        with_retry("insert_marker", &self.config.retry, || {
            self.store.insert_marker(record.clone())
        })
        .await?;

        state.markers_imported += 1;
        Ok(())
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<(), ImportError> {
    if cancel.is_cancelled() {
        Err(ImportError::Cancelled)
    } else {
        Ok(())
    }
}

/// Distinct texture names referenced by the selected segments' grids.
fn texture_names(
    doc: &MapDocument,
    selected: &[Segment],
    grids_by_segment: &HashMap<u64, Vec<&GridData>>,
) -> Vec<String> {
    let mut names = Vec::new();
    for segment in selected {
        let Some(grids) = grids_by_segment.get(&segment.id) else {
            continue;
        };
        for grid in grids {
            for index in grid.used_tilesets() {
                if let Some(name) = doc.tileset_name(index) {
                    if !names.iter().any(|n| n == name) {
                        names.push(name.to_string());
                    }
                }
            }
        }
    }
    names
}
