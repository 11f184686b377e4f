//! Chained texture resolution: memory cache, disk cache, remote fetch.

use super::cache::TextureCache;
use super::source::{FetchError, TextureSource};
use super::{DEFAULT_CACHE_CAPACITY, DEFAULT_FETCH_CONCURRENCY};
use image::RgbaImage;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// PNG signature; anything a remote returns without it is rejected
/// before the decoder ever sees the bytes.
const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Configuration for the texture fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// In-memory cache capacity in entries
    pub cache_capacity: usize,
    /// Bound on concurrent remote fetches
    pub concurrency: usize,
    /// Local disk cache directory; `None` disables the disk tier
    pub disk_cache_dir: Option<PathBuf>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            concurrency: DEFAULT_FETCH_CONCURRENCY,
            disk_cache_dir: None,
        }
    }
}

/// Resolves tileset names to decoded textures.
///
/// Lookup order: in-memory LRU cache, local disk cache, remote source.
/// A texture that cannot be resolved yields `None` and the run carries
/// on; the first network-class failure is kept as a diagnostic for the
/// import summary.
pub struct TextureFetcher<S: TextureSource> {
    source: S,
    cache: TextureCache,
    permits: Semaphore,
    disk_dir: Option<PathBuf>,
    first_error: Mutex<Option<FetchError>>,
}

impl<S: TextureSource> TextureFetcher<S> {
    /// Creates a fetcher over the given source.
    pub fn new(source: S, config: FetcherConfig) -> Self {
        Self {
            source,
            cache: TextureCache::new(config.cache_capacity),
            permits: Semaphore::new(config.concurrency.max(1)),
            disk_dir: config.disk_cache_dir,
            first_error: Mutex::new(None),
        }
    }

    /// Resolves one texture, returning a shared handle or `None` when
    /// every tier fails.
    pub async fn resolve(&self, name: &str) -> Option<Arc<RgbaImage>> {
        if let Some(image) = self.cache.get(name) {
            trace!(name, "texture memory hit");
            return Some(image);
        }

        if let Some(image) = self.resolve_from_disk(name).await {
            self.cache.put(name, Arc::clone(&image));
            return Some(image);
        }

        match self.resolve_from_remote(name).await {
            Ok(image) => {
                self.cache.put(name, Arc::clone(&image));
                Some(image)
            }
            Err(error) => {
                warn!(name, %error, "texture unresolved, cells will render gray");
                self.record_failure(error);
                None
            }
        }
    }

    /// Resolves a set of names concurrently, bounded by the configured
    /// permit count. Returns how many resolved.
    pub async fn prefetch(self: Arc<Self>, names: Vec<String>, cancel: &CancellationToken) -> usize
    where
        S: 'static,
    {
        let mut tasks = JoinSet::new();
        for name in names {
            let fetcher = Arc::clone(&self);
            tasks.spawn(async move { fetcher.resolve(&name).await.is_some() });
        }

        let mut resolved = 0;
        while let Some(result) = tasks.join_next().await {
            if cancel.is_cancelled() {
                tasks.abort_all();
                break;
            }
            match result {
                Ok(true) => resolved += 1,
                Ok(false) => {}
                Err(join_err) => {
                    warn!(error = %join_err, "texture prefetch task panicked");
                }
            }
        }
        resolved
    }

    /// Builds the index → texture table the rasterizer consumes.
    ///
    /// Indices whose name is missing from the tileset table or whose
    /// texture fails to resolve are simply absent from the result.
    pub async fn resolve_table(
        &self,
        tilesets: &[String],
        used: &[u16],
    ) -> HashMap<u16, Arc<RgbaImage>> {
        let mut table = HashMap::new();
        for &index in used {
            let Some(name) = tilesets.get(index as usize) else {
                continue;
            };
            if let Some(image) = self.resolve(name).await {
                table.insert(index, image);
            }
        }
        table
    }

    /// The first network-class failure seen by this fetcher, if any.
    pub fn first_error(&self) -> Option<FetchError> {
        self.first_error.lock().unwrap().clone()
    }

    /// Cache statistics for diagnostics.
    pub fn cache_stats(&self) -> super::TextureCacheStats {
        self.cache.stats()
    }

    fn record_failure(&self, error: FetchError) {
        if !error.is_network() {
            return;
        }
        let mut first = self.first_error.lock().unwrap();
        if first.is_none() {
            *first = Some(error);
        }
    }

    async fn resolve_from_disk(&self, name: &str) -> Option<Arc<RgbaImage>> {
        let path = self.disk_path(name)?;
        let bytes = tokio::fs::read(&path).await.ok()?;
        match image::load_from_memory(&bytes) {
            Ok(image) => {
                trace!(name, path = %path.display(), "texture disk hit");
                Some(Arc::new(image.to_rgba8()))
            }
            Err(e) => {
                warn!(name, path = %path.display(), error = %e, "corrupt disk cache entry");
                None
            }
        }
    }

    async fn resolve_from_remote(&self, name: &str) -> Result<Arc<RgbaImage>, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("texture fetch semaphore closed");

        let bytes = self.source.fetch(name).await?;

        if bytes.len() < PNG_MAGIC.len() || bytes[..PNG_MAGIC.len()] != PNG_MAGIC {
            return Err(FetchError::NotAnImage {
                name: name.to_string(),
            });
        }

        let image = image::load_from_memory(&bytes)
            .map_err(|e| FetchError::Decode {
                name: name.to_string(),
                message: e.to_string(),
            })?
            .to_rgba8();

        debug!(name, bytes = bytes.len(), "texture fetched from remote");
        self.write_disk_cache(name, &bytes).await;

        Ok(Arc::new(image))
    }

    /// Best effort: a failed disk write only costs a re-download later.
    async fn write_disk_cache(&self, name: &str, bytes: &[u8]) {
        let Some(path) = self.disk_path(name) else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(name, error = %e, "failed to create texture cache dir");
                return;
            }
        }
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            warn!(name, path = %path.display(), error = %e, "failed to write texture cache");
        }
    }

    fn disk_path(&self, name: &str) -> Option<PathBuf> {
        let dir = self.disk_dir.as_ref()?;
        // Resource names carry slashes; flatten them so the cache stays
        // a single directory.
        Some(dir.join(format!("{}.png", name.replace(['/', '\\'], "_"))))
    }
}
