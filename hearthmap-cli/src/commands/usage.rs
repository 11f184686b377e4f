//! `hearthmap usage` - reconcile tenant storage usage from disk.

use crate::error::CliError;
use clap::Args;
use hearthmap::storage::{reconcile_usage, BlobStorage};
use hearthmap::store::{Datastore, MemoryStore, RetryConfig, TenantRecord};
use std::path::PathBuf;

#[derive(Args)]
pub struct UsageArgs {
    /// Tenant to reconcile
    #[arg(long)]
    pub tenant: String,

    /// Root directory of rendered tiles
    #[arg(long, default_value = "./tiles")]
    pub storage_root: PathBuf,

    /// Tenant storage quota in megabytes
    #[arg(long, default_value = "512")]
    pub quota_mb: u64,
}

pub async fn run(args: UsageArgs) -> Result<(), CliError> {
    let blob = BlobStorage::new(&args.storage_root);
    let store = MemoryStore::new();
    store
        .upsert_tenant(TenantRecord::new(&args.tenant, args.quota_mb))
        .await
        .map_err(|e| CliError::Reconcile(e.to_string()))?;

    let summary = reconcile_usage(&blob, &store, &RetryConfig::default(), &args.tenant)
        .await
        .map_err(|e| CliError::Reconcile(e.to_string()))?;

    println!("tenant:      {}", summary.tenant_id);
    println!("files:       {}", summary.file_count);
    println!("total bytes: {}", summary.total_size_bytes);
    println!("total MB:    {:.2}", summary.total_size_mb);
    println!("computed at: {}", summary.calculated_at.to_rfc3339());

    Ok(())
}
