//! Tenant usage reconciliation.
//!
//! Recorded usage drifts from reality: imports estimate, cleanups are
//! best-effort, operators delete files by hand. Reconciliation walks a
//! tenant's blob tree, resets the recorded counter to the actual total,
//! and writes a `.storage.json` summary next to the tenant's maps.

use super::blob::BlobStorage;
use super::paths::{summary_rel_path, tenant_root};
use crate::store::{with_retry, Datastore, RetryConfig, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from usage reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("tenant {0} does not exist")]
    UnknownTenant(String),

    #[error("storage walk failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Summary written to `tenants/{tenant}/.storage.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub tenant_id: String,
    pub calculated_at: DateTime<Utc>,
    pub total_size_bytes: u64,
    #[serde(rename = "totalSizeMB")]
    pub total_size_mb: f64,
    pub file_count: u64,
}

/// Recomputes a tenant's usage from the blob tree.
///
/// Updates the tenant record to the measured total and writes the
/// summary file. Dotfiles (the summary itself included) are excluded
/// from both the byte total and the file count.
pub async fn reconcile_usage<S: Datastore>(
    blob: &BlobStorage,
    store: &S,
    retry: &RetryConfig,
    tenant: &str,
) -> Result<UsageSummary, ReconcileError> {
    let record = store
        .get_tenant(tenant)
        .await?
        .ok_or_else(|| ReconcileError::UnknownTenant(tenant.to_string()))?;

    let (total_size_bytes, file_count) = measure_tree(blob.absolute(&tenant_root(tenant))).await?;

    let summary = UsageSummary {
        tenant_id: tenant.to_string(),
        calculated_at: Utc::now(),
        total_size_bytes,
        total_size_mb: total_size_bytes as f64 / (1024.0 * 1024.0),
        file_count,
    };

    // Reset the recorded counter to the measured truth.
    let delta = total_size_bytes as i64 - record.usage_bytes as i64;
    with_retry("adjust_usage", retry, || store.adjust_usage(tenant, delta)).await?;

    let json = serde_json::to_vec_pretty(&summary).expect("summary serializes");
    blob.write(&summary_rel_path(tenant), &json).await?;

    info!(
        tenant,
        total_size_bytes,
        file_count,
        drift_bytes = delta,
        "storage usage reconciled"
    );

    Ok(summary)
}

/// Sums file sizes under a directory, iteratively to keep the walk
/// non-recursive in async context. A missing root is zero usage.
async fn measure_tree(root: PathBuf) -> Result<(u64, u64), std::io::Error> {
    let mut total = 0u64;
    let mut count = 0u64;
    let mut pending = vec![root];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                match entry.metadata().await {
                    Ok(metadata) => {
                        total += metadata.len();
                        count += 1;
                    }
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                    }
                }
            }
        }
    }

    Ok((total, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, TenantRecord};

    #[tokio::test]
    async fn test_reconcile_measures_and_updates() {
        let dir = tempfile::tempdir().unwrap();
        let blob = BlobStorage::new(dir.path());
        let store = MemoryStore::new();
        let retry = RetryConfig::default();

        let mut tenant = TenantRecord::new("t1", 100);
        tenant.usage_bytes = 999_999; // stale estimate
        store.upsert_tenant(tenant).await.unwrap();

        blob.write("tenants/t1/1/0/0_0.png", &[0u8; 1000]).await.unwrap();
        blob.write("tenants/t1/1/1/0_0.png", &[0u8; 500]).await.unwrap();

        let summary = reconcile_usage(&blob, &store, &retry, "t1").await.unwrap();
        assert_eq!(summary.total_size_bytes, 1500);
        assert_eq!(summary.file_count, 2);

        let record = store.get_tenant("t1").await.unwrap().unwrap();
        assert_eq!(record.usage_bytes, 1500);
    }

    #[tokio::test]
    async fn test_reconcile_writes_summary_json() {
        let dir = tempfile::tempdir().unwrap();
        let blob = BlobStorage::new(dir.path());
        let store = MemoryStore::new();
        store.upsert_tenant(TenantRecord::new("t1", 100)).await.unwrap();

        blob.write("tenants/t1/1/0/0_0.png", &[0u8; 64]).await.unwrap();
        reconcile_usage(&blob, &store, &RetryConfig::default(), "t1")
            .await
            .unwrap();

        let bytes = blob.read("tenants/t1/.storage.json").await.unwrap().unwrap();
        let parsed: UsageSummary = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.tenant_id, "t1");
        assert_eq!(parsed.total_size_bytes, 64);
        assert_eq!(parsed.file_count, 1);

        // Field names on the wire are camelCase.
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"tenantId\""));
        assert!(text.contains("\"calculatedAt\""));
        assert!(text.contains("\"totalSizeMB\""));
    }

    #[tokio::test]
    async fn test_reconcile_excludes_dotfiles() {
        let dir = tempfile::tempdir().unwrap();
        let blob = BlobStorage::new(dir.path());
        let store = MemoryStore::new();
        store.upsert_tenant(TenantRecord::new("t1", 100)).await.unwrap();

        blob.write("tenants/t1/.storage.json", &[0u8; 512]).await.unwrap();
        blob.write("tenants/t1/1/0/0_0.png", &[0u8; 100]).await.unwrap();

        let summary = reconcile_usage(&blob, &store, &RetryConfig::default(), "t1")
            .await
            .unwrap();
        assert_eq!(summary.total_size_bytes, 100);
        assert_eq!(summary.file_count, 1);
    }

    #[tokio::test]
    async fn test_reconcile_missing_root_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let blob = BlobStorage::new(dir.path());
        let store = MemoryStore::new();
        store.upsert_tenant(TenantRecord::new("empty", 100)).await.unwrap();

        let summary = reconcile_usage(&blob, &store, &RetryConfig::default(), "empty")
            .await
            .unwrap();
        assert_eq!(summary.total_size_bytes, 0);
        assert_eq!(summary.file_count, 0);
    }

    #[tokio::test]
    async fn test_reconcile_unknown_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let blob = BlobStorage::new(dir.path());
        let store = MemoryStore::new();

        let result = reconcile_usage(&blob, &store, &RetryConfig::default(), "ghost").await;
        assert!(matches!(result, Err(ReconcileError::UnknownTenant(_))));
    }
}
