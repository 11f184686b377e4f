//! Hearthmap - map-export ingestion and tile pyramid rendering
//!
//! This library ingests the binary "hmap" export format produced by the game
//! client, rasterizes per-grid tile images from embedded tileset references
//! and heightmap data, and maintains a multi-resolution zoom pyramid per map
//! so a viewer can request any zoom level without recomputation.
//!
//! # High-Level API
//!
//! For most use cases, the [`import`] module provides the entry point:
//!
//! ```ignore
//! use hearthmap::import::{Importer, ImportConfig, ImportMode};
//!
//! let importer = Importer::new(store, blob, fetcher, sessions, ImportConfig::default());
//! let result = importer
//!     .import(&bytes, "tenant-1", ImportMode::CreateNew, None, token)
//!     .await;
//! ```

pub mod coord;
pub mod hmap;
pub mod import;
pub mod logging;
pub mod pyramid;
pub mod render;
pub mod storage;
pub mod store;
pub mod texture;

/// Version of the Hearthmap library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
