//! Tile coordinate module
//!
//! Provides the grid-cell coordinate type shared by the rasterizer, the
//! zoom pyramid builder and the persistence layer, together with the
//! parent/child math that defines the pyramid.

mod types;

pub use types::{AncestorsIter, TileCoord, MAX_ZOOM, MIN_ZOOM};
