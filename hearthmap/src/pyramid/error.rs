//! Error types for pyramid building.

use crate::storage::QuotaError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors from building or persisting a pyramid tile.
#[derive(Debug, Error)]
pub enum PyramidError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error("tile i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("png encode failed: {0}")]
    Encode(String),

    #[error("tenant {0} does not exist")]
    UnknownTenant(String),
}
