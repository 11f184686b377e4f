//! Stream parsing for the hmap export format.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! magic            8 bytes  "HNHMAPX1"
//! tileset count    u16      followed by that many length-prefixed names
//! segment count    u32
//!   segment id     u64
//!   grid count     u32
//!     grid id      length-prefixed string (u16 length)
//!     x, y         i32, i32
//!     flags        u8       bit 0: heights present
//!     tiles        10_000 × u16
//!     heights      10_000 × f32 (only when flagged)
//!     extra len    u32      skipped (forward compatibility)
//! marker count     u32
//!   segment id     u64
//!   x, y           i32, i32
//!   name, icon     length-prefixed strings
//! ```
//!
//! Trailing bytes after the marker table are ignored: newer clients may
//! append sections this application does not use.

use super::error::HmapError;
use super::types::{GridData, MapDocument, MarkerData, GRID_CELLS};
use crate::coord::TileCoord;
use tracing::{debug, trace};

const MAGIC: &[u8; 8] = b"HNHMAPX1";

/// Sanity bounds. An export past these is corrupt, not merely large.
const MAX_TILESETS: usize = 4096;
const MAX_SEGMENTS: usize = 10_000;
const MAX_GRIDS_PER_SEGMENT: usize = 100_000;
const MAX_MARKERS: usize = 1_000_000;
const MAX_STRING_LEN: usize = 4096;
const MAX_EXTRA_LEN: usize = 16 * 1024 * 1024;

/// Parses a complete hmap export stream.
///
/// # Errors
///
/// Returns [`HmapError`] if the stream does not match the expected
/// header or record layout. No partial document is ever returned.
pub fn parse(bytes: &[u8]) -> Result<MapDocument, HmapError> {
    let mut r = StreamReader::new(bytes);

    let magic = r.take(MAGIC.len(), "magic")?;
    if magic != MAGIC {
        return Err(HmapError::BadMagic);
    }

    let tileset_count = bounded(r.take_u16("tileset count")? as usize, "tileset", MAX_TILESETS)?;
    let mut tilesets = Vec::with_capacity(tileset_count);
    for _ in 0..tileset_count {
        tilesets.push(r.take_string("tileset name")?);
    }

    let segment_count = bounded(r.take_u32("segment count")? as usize, "segment", MAX_SEGMENTS)?;
    let mut grids = Vec::new();
    for _ in 0..segment_count {
        let segment = r.take_u64("segment id")?;
        let grid_count = bounded(
            r.take_u32("grid count")? as usize,
            "grid",
            MAX_GRIDS_PER_SEGMENT,
        )?;
        for _ in 0..grid_count {
            grids.push(read_grid(&mut r, segment)?);
        }
        trace!(segment, grid_count, "parsed segment");
    }

    let marker_count = bounded(r.take_u32("marker count")? as usize, "marker", MAX_MARKERS)?;
    let mut markers = Vec::with_capacity(marker_count);
    for _ in 0..marker_count {
        markers.push(MarkerData {
            segment: r.take_u64("marker segment")?,
            x: r.take_i32("marker x")?,
            y: r.take_i32("marker y")?,
            name: r.take_string("marker name")?,
            icon: r.take_string("marker icon")?,
        });
    }

    debug!(
        tilesets = tilesets.len(),
        segments = segment_count,
        grids = grids.len(),
        markers = markers.len(),
        trailing = r.remaining(),
        "hmap stream parsed"
    );

    Ok(MapDocument {
        tilesets,
        grids,
        markers,
    })
}

fn read_grid(r: &mut StreamReader<'_>, segment: u64) -> Result<GridData, HmapError> {
    let id = r.take_string("grid id")?;
    let x = r.take_i32("grid x")?;
    let y = r.take_i32("grid y")?;
    let flags = r.take_u8("grid flags")?;

    let mut tiles = Vec::with_capacity(GRID_CELLS);
    for _ in 0..GRID_CELLS {
        tiles.push(r.take_u16("grid tiles")?);
    }

    let heights = if flags & 0x01 != 0 {
        let mut heights = Vec::with_capacity(GRID_CELLS);
        for _ in 0..GRID_CELLS {
            heights.push(r.take_f32("grid heights")?);
        }
        Some(heights)
    } else {
        None
    };

    // Extra data block: written by newer clients, not consumed here.
    let extra_len = r.take_u32("grid extra length")? as usize;
    if extra_len > MAX_EXTRA_LEN {
        return Err(HmapError::CountOutOfRange {
            what: "grid extra bytes",
            count: extra_len,
            limit: MAX_EXTRA_LEN,
        });
    }
    r.take(extra_len, "grid extra data")?;

    Ok(GridData {
        id,
        segment,
        coord: TileCoord::base(x, y),
        tiles,
        heights,
    })
}

fn bounded(count: usize, what: &'static str, limit: usize) -> Result<usize, HmapError> {
    if count > limit {
        return Err(HmapError::CountOutOfRange { what, count, limit });
    }
    Ok(count)
}

/// Cursor over the raw export bytes.
struct StreamReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> StreamReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], HmapError> {
        if self.remaining() < len {
            return Err(HmapError::UnexpectedEof {
                offset: self.pos,
                what,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_u8(&mut self, what: &'static str) -> Result<u8, HmapError> {
        Ok(self.take(1, what)?[0])
    }

    fn take_u16(&mut self, what: &'static str) -> Result<u16, HmapError> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn take_u32(&mut self, what: &'static str) -> Result<u32, HmapError> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take_i32(&mut self, what: &'static str) -> Result<i32, HmapError> {
        let b = self.take(4, what)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take_u64(&mut self, what: &'static str) -> Result<u64, HmapError> {
        let b = self.take(8, what)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn take_f32(&mut self, what: &'static str) -> Result<f32, HmapError> {
        let b = self.take(4, what)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take_string(&mut self, what: &'static str) -> Result<String, HmapError> {
        let len = self.take_u16(what)? as usize;
        if len > MAX_STRING_LEN {
            return Err(HmapError::CountOutOfRange {
                what,
                count: len,
                limit: MAX_STRING_LEN,
            });
        }
        let offset = self.pos;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| HmapError::InvalidString { offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmap::testutil::ExportBuilder;

    #[test]
    fn test_parse_minimal_document() {
        let bytes = ExportBuilder::new()
            .tileset("gfx/tiles/grass")
            .segment(42)
            .grid("abc123", 0, 0, 0)
            .build();

        let doc = parse(&bytes).unwrap();
        assert_eq!(doc.tilesets, vec!["gfx/tiles/grass"]);
        assert_eq!(doc.grids.len(), 1);
        assert_eq!(doc.grids[0].id, "abc123");
        assert_eq!(doc.grids[0].segment, 42);
        assert_eq!(doc.grids[0].tiles.len(), GRID_CELLS);
        assert!(doc.grids[0].heights.is_none());
        assert!(doc.markers.is_empty());
    }

    #[test]
    fn test_parse_grid_with_heights() {
        let bytes = ExportBuilder::new()
            .tileset("gfx/tiles/rock")
            .segment(1)
            .grid_with("g1", -2, 3, vec![0; GRID_CELLS], Some(vec![4.5; GRID_CELLS]))
            .build();

        let doc = parse(&bytes).unwrap();
        let heights = doc.grids[0].heights.as_ref().unwrap();
        assert_eq!(heights.len(), GRID_CELLS);
        assert!((heights[0] - 4.5).abs() < f32::EPSILON);
        assert_eq!(doc.grids[0].coord, TileCoord::base(-2, 3));
    }

    #[test]
    fn test_parse_markers() {
        let bytes = ExportBuilder::new()
            .segment(9)
            .grid("g", 0, 0, 0)
            .marker(9, 17, -205, "Crossroads")
            .build();

        let doc = parse(&bytes).unwrap();
        assert_eq!(doc.markers.len(), 1);
        assert_eq!(doc.markers[0].name, "Crossroads");
        assert_eq!(doc.markers[0].x, 17);
        assert_eq!(doc.markers[0].y, -205);
    }

    #[test]
    fn test_parse_tolerates_trailing_bytes() {
        let bytes = ExportBuilder::new()
            .segment(1)
            .grid("g", 0, 0, 0)
            .trailing(&[0xDE, 0xAD, 0xBE, 0xEF])
            .build();

        assert!(parse(&bytes).is_ok());
    }

    #[test]
    fn test_parse_rejects_bad_magic() {
        let mut bytes = ExportBuilder::new().build();
        bytes[0] = b'X';
        assert_eq!(parse(&bytes), Err(HmapError::BadMagic));
    }

    #[test]
    fn test_parse_rejects_truncated_grid() {
        let bytes = ExportBuilder::new().segment(1).grid("g", 0, 0, 0).build();
        // Chop the stream mid-grid.
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(
            parse(truncated),
            Err(HmapError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_empty_stream() {
        assert!(matches!(
            parse(&[]),
            Err(HmapError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_absurd_counts() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&u16::MAX.to_le_bytes()); // 65535 tilesets
        assert!(matches!(
            parse(&bytes),
            Err(HmapError::CountOutOfRange { what: "tileset", .. })
        ));
    }

    #[test]
    fn test_parse_rejects_invalid_utf8_string() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&1u16.to_le_bytes()); // one tileset
        bytes.extend_from_slice(&2u16.to_le_bytes()); // name length 2
        bytes.extend_from_slice(&[0xFF, 0xFE]); // not UTF-8
        assert!(matches!(
            parse(&bytes),
            Err(HmapError::InvalidString { .. })
        ));
    }
}
