//! Error types for the persistence layer.

use thiserror::Error;

/// Errors from datastore operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The store's write lock was held; the operation may be retried
    #[error("datastore contention on {op}")]
    Contention { op: &'static str },

    /// Retry budget exhausted; fatal for this operation
    #[error("datastore contention persisted after {attempts} attempts on {op}")]
    ContentionExhausted { op: String, attempts: u32 },

    /// Tenant row does not exist
    #[error("unknown tenant {0}")]
    UnknownTenant(String),

    /// Tenant exists but is deactivated
    #[error("tenant {0} is not active")]
    TenantInactive(String),

    /// A row violated its uniqueness key
    #[error("duplicate {what} {key} for tenant {tenant}")]
    Duplicate {
        what: &'static str,
        key: String,
        tenant: String,
    },

    /// A request-scoped handle touched another tenant's rows
    #[error("scope violation: tenant {scope} accessed rows of {row}")]
    ScopeViolation { scope: String, row: String },
}
