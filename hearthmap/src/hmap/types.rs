//! Parsed document types.

use crate::coord::TileCoord;
use std::collections::HashMap;

/// Cells per grid side.
pub const GRID_SIDE: usize = 100;

/// Total cells per grid.
pub const GRID_CELLS: usize = GRID_SIDE * GRID_SIDE;

/// One 100×100-tile chunk of world terrain from the export.
#[derive(Debug, Clone, PartialEq)]
pub struct GridData {
    /// Content-derived identifier. Unique per tenant only, never globally.
    pub id: String,
    /// Segment this grid belongs to.
    pub segment: u64,
    /// Position at zoom 0.
    pub coord: TileCoord,
    /// One tileset-table index per cell, row-major.
    pub tiles: Vec<u16>,
    /// Per-cell terrain heights, row-major. Absent in flat exports.
    pub heights: Option<Vec<f32>>,
}

impl GridData {
    /// Distinct tileset indices referenced by this grid's cells.
    pub fn used_tilesets(&self) -> Vec<u16> {
        let mut used: Vec<u16> = self.tiles.clone();
        used.sort_unstable();
        used.dedup();
        used
    }
}

/// A point of interest with world tile coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerData {
    /// Segment this marker belongs to.
    pub segment: u64,
    /// World tile X.
    pub x: i32,
    /// World tile Y.
    pub y: i32,
    /// Display name.
    pub name: String,
    /// Icon resource reference.
    pub icon: String,
}

/// A connected cluster of grids within one export document.
#[derive(Debug, Clone)]
pub struct Segment {
    pub id: u64,
    pub grid_count: usize,
}

/// A fully parsed hmap export.
///
/// The document owns every grid and marker in the stream; segment views
/// borrow from it. Fields the application does not use (the per-grid
/// extra-data blocks, trailing bytes) were skipped during parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapDocument {
    /// Tileset resource names, indexed by grid cell values.
    pub tilesets: Vec<String>,
    /// Every grid in the stream, in stream order.
    pub grids: Vec<GridData>,
    /// Every marker in the stream, in stream order.
    pub markers: Vec<MarkerData>,
}

impl MapDocument {
    /// Grids grouped by segment id.
    pub fn grids_by_segment(&self) -> HashMap<u64, Vec<&GridData>> {
        let mut map: HashMap<u64, Vec<&GridData>> = HashMap::new();
        for grid in &self.grids {
            map.entry(grid.segment).or_default().push(grid);
        }
        map
    }

    /// Markers grouped by segment id.
    pub fn markers_by_segment(&self) -> HashMap<u64, Vec<&MarkerData>> {
        let mut map: HashMap<u64, Vec<&MarkerData>> = HashMap::new();
        for marker in &self.markers {
            map.entry(marker.segment).or_default().push(marker);
        }
        map
    }

    /// Segments present in the document with their grid counts,
    /// largest first.
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments: Vec<Segment> = self
            .grids_by_segment()
            .into_iter()
            .map(|(id, grids)| Segment {
                id,
                grid_count: grids.len(),
            })
            .collect();
        segments.sort_by(|a, b| b.grid_count.cmp(&a.grid_count).then(a.id.cmp(&b.id)));
        segments
    }

    /// Tileset name for a cell index, if the table covers it.
    #[inline]
    pub fn tileset_name(&self, index: u16) -> Option<&str> {
        self.tilesets.get(index as usize).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(id: &str, segment: u64) -> GridData {
        GridData {
            id: id.to_string(),
            segment,
            coord: TileCoord::base(0, 0),
            tiles: vec![0; GRID_CELLS],
            heights: None,
        }
    }

    #[test]
    fn test_grids_by_segment() {
        let doc = MapDocument {
            tilesets: vec![],
            grids: vec![grid("a", 1), grid("b", 2), grid("c", 1)],
            markers: vec![],
        };

        let by_segment = doc.grids_by_segment();
        assert_eq!(by_segment[&1].len(), 2);
        assert_eq!(by_segment[&2].len(), 1);
    }

    #[test]
    fn test_segments_sorted_largest_first() {
        let doc = MapDocument {
            tilesets: vec![],
            grids: vec![grid("a", 7), grid("b", 3), grid("c", 3), grid("d", 3)],
            markers: vec![],
        };

        let segments = doc.segments();
        assert_eq!(segments[0].id, 3);
        assert_eq!(segments[0].grid_count, 3);
        assert_eq!(segments[1].id, 7);
        assert_eq!(segments[1].grid_count, 1);
    }

    #[test]
    fn test_used_tilesets_dedups() {
        let mut g = grid("a", 1);
        g.tiles = vec![3, 1, 3, 1, 2];
        assert_eq!(g.used_tilesets(), vec![1, 2, 3]);
    }

    #[test]
    fn test_tileset_name_lookup() {
        let doc = MapDocument {
            tilesets: vec!["gfx/tiles/grass".to_string()],
            grids: vec![],
            markers: vec![],
        };
        assert_eq!(doc.tileset_name(0), Some("gfx/tiles/grass"));
        assert_eq!(doc.tileset_name(1), None);
    }
}
