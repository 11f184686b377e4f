//! In-memory texture cache with LRU eviction.

use image::RgbaImage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Entry in the texture cache.
struct CacheEntry {
    /// Decoded texture, shared with callers
    image: Arc<RgbaImage>,
    /// Last access time for LRU eviction
    last_accessed: Instant,
    /// Number of times accessed
    access_count: u64,
}

impl CacheEntry {
    fn new(image: Arc<RgbaImage>) -> Self {
        Self {
            image,
            last_accessed: Instant::now(),
            access_count: 0,
        }
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
        self.access_count += 1;
    }
}

/// Counters describing cache behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextureCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entry_count: usize,
}

/// Fixed-capacity texture cache keyed by resource name.
///
/// Inserting past capacity evicts the least-recently-touched entry,
/// dropping its handle. Readers receive an `Arc` snapshot, so an entry
/// evicted while a caller still holds a handle stays alive until that
/// handle is dropped - eviction can never invalidate an image in use.
pub struct TextureCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    stats: TextureCacheStats,
}

impl TextureCache {
    /// Creates a cache holding at most `capacity` textures.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: TextureCacheStats::default(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Returns a handle to a cached texture, updating its access time.
    pub fn get(&self, name: &str) -> Option<Arc<RgbaImage>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.entries.get_mut(name) {
            Some(entry) => {
                entry.touch();
                let image = Arc::clone(&entry.image);
                inner.stats.hits += 1;
                Some(image)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Inserts a texture, evicting the least-recently-used entry if the
    /// cache is full.
    pub fn put(&self, name: impl Into<String>, image: Arc<RgbaImage>) {
        let name = name.into();
        let mut inner = self.inner.lock().unwrap();

        if !inner.entries.contains_key(&name) && inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(key, _)| key.clone())
            {
                inner.entries.remove(&oldest);
                inner.stats.evictions += 1;
            }
        }

        inner.entries.insert(name, CacheEntry::new(image));
        inner.stats.entry_count = inner.entries.len();
    }

    /// Check if a name is currently cached.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().unwrap().entries.contains_key(name)
    }

    /// Current number of entries.
    pub fn entry_count(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Snapshot of cache statistics.
    pub fn stats(&self) -> TextureCacheStats {
        let inner = self.inner.lock().unwrap();
        TextureCacheStats {
            entry_count: inner.entries.len(),
            ..inner.stats
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.stats.entry_count = 0;
    }
}
