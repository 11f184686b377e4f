//! Orchestrator-level error type.
//!
//! Internal to the run: at the public boundary every variant is folded
//! into an [`crate::import::ImportResult`] with `success: false`.

use crate::hmap::HmapError;
use crate::pyramid::PyramidError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors that abort an import run.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The export stream is malformed; nothing was imported
    #[error("malformed export: {0}")]
    Parse(#[from] HmapError),

    /// Tenant row missing or deactivated
    #[error("tenant {0} does not exist or is not active")]
    BadTenant(String),

    /// Datastore failure past the retry budget
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Tile persistence failure in a phase that cannot degrade
    #[error(transparent)]
    Pyramid(#[from] PyramidError),

    /// The cancellation signal fired
    #[error("import cancelled")]
    Cancelled,
}
