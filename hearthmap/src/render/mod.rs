//! Grid rasterization
//!
//! Turns one grid's tile-index and height data, plus the resolved
//! tileset textures, into a single 100×100 base tile image.

mod rasterizer;

pub use rasterizer::{render_grid, TILE_PIXELS};
