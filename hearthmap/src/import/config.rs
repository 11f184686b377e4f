//! Import configuration.

use crate::pyramid::DEFAULT_BATCH_SIZE;
use crate::store::RetryConfig;
use std::time::Duration;

/// How an import treats grids already present for the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Always create a fresh map per segment and import every grid.
    CreateNew,
    /// Reuse the map of any already-present grid and import only the
    /// grids not yet known; falls back to a new map when no grid of the
    /// segment exists.
    Merge,
}

/// Tunables for an import run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Keep only the largest N segments of an export. A product policy,
    /// not a technical limit.
    pub max_segments: usize,
    /// Bound on dirty markers processed per rebuild batch.
    pub rebuild_batch_size: usize,
    /// How long an imported grid stays fresh before a client may
    /// re-upload it.
    pub refetch_after: Duration,
    /// Retry policy for contended datastore writes.
    pub retry: RetryConfig,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_segments: 3,
            rebuild_batch_size: DEFAULT_BATCH_SIZE,
            refetch_after: Duration::from_secs(60 * 60),
            retry: RetryConfig::default(),
        }
    }
}

impl ImportConfig {
    /// Overrides the segment retention policy.
    pub fn with_max_segments(mut self, max_segments: usize) -> Self {
        self.max_segments = max_segments;
        self
    }

    /// Overrides the rebuild batch bound.
    pub fn with_rebuild_batch_size(mut self, batch_size: usize) -> Self {
        self.rebuild_batch_size = batch_size;
        self
    }
}
