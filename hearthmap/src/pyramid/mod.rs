//! Zoom pyramid construction
//!
//! A map's pyramid spans zoom 0..=6: level 0 tiles come straight from
//! the rasterizer, each higher tile aggregates its four children. Builds
//! are incremental - dirty markers record exactly which ancestors are
//! stale - and cascading levels share tiles through an in-run
//! reference-counted arena instead of re-reading them from disk.

mod arena;
mod builder;
mod error;
mod rebuild;

pub use arena::TileArena;
pub use builder::PyramidBuilder;
pub use error::PyramidError;
pub use rebuild::{RebuildRunner, RebuildStats, DEFAULT_BATCH_SIZE};
