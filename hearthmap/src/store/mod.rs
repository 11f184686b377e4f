//! Persistence contracts
//!
//! The durable store is an external collaborator: this module specifies
//! the table contracts (tenants, maps, grids, tiles, dirty markers) as a
//! trait, provides the in-memory implementation used by tests and the
//! CLI, and the bounded-retry machinery for the embedded store's
//! whole-file write lock.

mod dirty;
mod error;
mod memory;
mod retry;
mod traits;
mod types;

pub use dirty::mark_ancestors_dirty;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use retry::{with_retry, RetryConfig};
pub use traits::Datastore;
pub use types::{
    DirtyMarker, GridRecord, MapId, MapRecord, MarkerRecord, Scope, TenantRecord, TileKey,
    TileRecord,
};
