//! Test fixture builder emitting well-formed export streams.

use super::types::GRID_CELLS;

pub(crate) const MAGIC: &[u8; 8] = b"HNHMAPX1";

/// Builds hmap byte streams for tests, segment by segment.
#[derive(Default)]
pub(crate) struct ExportBuilder {
    tilesets: Vec<String>,
    segments: Vec<(u64, Vec<GridSpec>)>,
    markers: Vec<(u64, i32, i32, String, String)>,
    trailing: Vec<u8>,
}

struct GridSpec {
    id: String,
    x: i32,
    y: i32,
    tiles: Vec<u16>,
    heights: Option<Vec<f32>>,
}

impl ExportBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn tileset(mut self, name: &str) -> Self {
        self.tilesets.push(name.to_string());
        self
    }

    pub(crate) fn segment(mut self, id: u64) -> Self {
        self.segments.push((id, Vec::new()));
        self
    }

    pub(crate) fn grid(self, id: &str, x: i32, y: i32, tile: u16) -> Self {
        self.grid_with(id, x, y, vec![tile; GRID_CELLS], None)
    }

    pub(crate) fn grid_with(
        mut self,
        id: &str,
        x: i32,
        y: i32,
        tiles: Vec<u16>,
        heights: Option<Vec<f32>>,
    ) -> Self {
        self.segments
            .last_mut()
            .expect("segment before grid")
            .1
            .push(GridSpec {
                id: id.to_string(),
                x,
                y,
                tiles,
                heights,
            });
        self
    }

    pub(crate) fn marker(mut self, segment: u64, x: i32, y: i32, name: &str) -> Self {
        self.markers
            .push((segment, x, y, name.to_string(), "icon/flag".to_string()));
        self
    }

    pub(crate) fn trailing(mut self, bytes: &[u8]) -> Self {
        self.trailing.extend_from_slice(bytes);
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(self.tilesets.len() as u16).to_le_bytes());
        for name in &self.tilesets {
            push_string(&mut out, name);
        }
        out.extend_from_slice(&(self.segments.len() as u32).to_le_bytes());
        for (id, grids) in &self.segments {
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&(grids.len() as u32).to_le_bytes());
            for grid in grids {
                push_string(&mut out, &grid.id);
                out.extend_from_slice(&grid.x.to_le_bytes());
                out.extend_from_slice(&grid.y.to_le_bytes());
                out.push(if grid.heights.is_some() { 1 } else { 0 });
                for tile in &grid.tiles {
                    out.extend_from_slice(&tile.to_le_bytes());
                }
                if let Some(heights) = &grid.heights {
                    for h in heights {
                        out.extend_from_slice(&h.to_le_bytes());
                    }
                }
                out.extend_from_slice(&0u32.to_le_bytes());
            }
        }
        out.extend_from_slice(&(self.markers.len() as u32).to_le_bytes());
        for (segment, x, y, name, icon) in &self.markers {
            out.extend_from_slice(&segment.to_le_bytes());
            out.extend_from_slice(&x.to_le_bytes());
            out.extend_from_slice(&y.to_le_bytes());
            push_string(&mut out, name);
            push_string(&mut out, icon);
        }
        out.extend_from_slice(&self.trailing);
        out
    }
}

pub(crate) fn push_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u16).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}
