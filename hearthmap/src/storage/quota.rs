//! Tenant storage quota enforcement.

use crate::store::TenantRecord;
use thiserror::Error;

/// A write was rejected by the tenant's storage quota.
///
/// Rejection applies to the specific write only; sibling writes in the
/// same batch proceed and are checked individually.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("tenant {tenant} over quota: {usage_bytes} + {requested_bytes} > {quota_bytes} bytes")]
pub struct QuotaError {
    pub tenant: String,
    pub requested_bytes: u64,
    pub usage_bytes: u64,
    pub quota_bytes: u64,
}

/// Checks whether a write of `requested_bytes` fits the tenant's quota.
///
/// Does not mutate usage: the caller increments after a successful
/// write, so a rejected write leaves usage exactly as it was.
pub fn check_quota(tenant: &TenantRecord, requested_bytes: u64) -> Result<(), QuotaError> {
    if tenant.has_capacity(requested_bytes) {
        Ok(())
    } else {
        Err(QuotaError {
            tenant: tenant.id.clone(),
            requested_bytes,
            usage_bytes: tenant.usage_bytes,
            quota_bytes: tenant.quota_bytes,
        })
    }
}
