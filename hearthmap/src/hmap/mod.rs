//! Binary map-export ("hmap") reader
//!
//! The game client exports terrain as an opaque binary stream: a tileset
//! name table, connected clusters of grids ("segments") with tile indices
//! and optional heightmaps, and a trailing marker table. This module
//! parses a full stream into a [`MapDocument`]; a stream that does not
//! match the expected layout is rejected wholesale - no partial parse is
//! ever returned.

mod error;
mod reader;
#[cfg(test)]
pub(crate) mod testutil;
mod types;

pub use error::HmapError;
pub use reader::parse;
pub use types::{GridData, MapDocument, MarkerData, Segment, GRID_CELLS, GRID_SIDE};
