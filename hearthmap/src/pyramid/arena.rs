//! Reference-counted in-run tile arena.
//!
//! During a cascading build, a tile produced at zoom `z` is consumed by
//! exactly one build at zoom `z+1`. The arena keeps such tiles in memory
//! between the two so the higher level never re-reads them from disk.
//! Entries are freed by an explicit [`TileArena::release`], not by
//! drop-order side effects: every registration must be paired with
//! exactly one release, and the count can never go negative.
//!
//! The arena is scoped to one import or rebuild run and is never
//! persisted.

use crate::store::TileKey;
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

struct ArenaEntry {
    image: Arc<RgbaImage>,
    refs: usize,
}

/// In-memory tile cache keyed by tile identity, with explicit
/// reference counts.
#[derive(Default)]
pub struct TileArena {
    inner: Mutex<HashMap<TileKey, ArenaEntry>>,
}

impl TileArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tile with an initial reference count.
    ///
    /// Registering an existing key replaces the image and adds the new
    /// references to the outstanding count.
    pub fn add(&self, key: TileKey, image: Arc<RgbaImage>, refs: usize) {
        if refs == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner
            .entry(key)
            .and_modify(|entry| {
                entry.image = Arc::clone(&image);
                entry.refs += refs;
            })
            .or_insert(ArenaEntry { image, refs });
    }

    /// Returns a handle to a retained tile without touching its count.
    pub fn get(&self, key: &TileKey) -> Option<Arc<RgbaImage>> {
        self.inner
            .lock()
            .unwrap()
            .get(key)
            .map(|entry| Arc::clone(&entry.image))
    }

    /// Releases one reference, freeing the tile when the count reaches
    /// zero. Returns whether a reference was actually released.
    ///
    /// Releasing an unknown key is a logged no-op, never an underflow.
    pub fn release(&self, key: &TileKey) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.get_mut(key) {
            Some(entry) => {
                entry.refs -= 1;
                if entry.refs == 0 {
                    inner.remove(key);
                }
                true
            }
            None => {
                warn!(tenant = %key.tenant, coord = %key.coord, "release of unretained tile");
                false
            }
        }
    }

    /// Number of tiles currently retained.
    pub fn retained_count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}
