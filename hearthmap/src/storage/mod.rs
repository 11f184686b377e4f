//! Blob storage layout and tenant storage accounting
//!
//! Rendered tiles live on a plain filesystem under a fixed layout:
//! base tiles at `tenants/{tenant}/{map}/0/{x}_{y}.png`, aggregated
//! zoom tiles at `tenants/{tenant}/{map}/{zoom}/{x}_{y}.png`. Usage
//! accounting is an approximation maintained by the import path and
//! periodically reconciled against the actual tree.

mod blob;
mod paths;
mod quota;
mod usage;

pub use blob::BlobStorage;
pub use paths::{summary_rel_path, tenant_root, tile_rel_path};
pub use quota::{check_quota, QuotaError};
pub use usage::{reconcile_usage, ReconcileError, UsageSummary};
