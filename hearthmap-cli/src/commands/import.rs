//! `hearthmap import` - run a full import against local storage.

use crate::error::CliError;
use clap::{Args, ValueEnum};
use hearthmap::import::{ImportConfig, ImportMode, ImportProgress, Importer, SessionService};
use hearthmap::storage::BlobStorage;
use hearthmap::store::{Datastore, MemoryStore, TenantRecord};
use hearthmap::texture::{FetcherConfig, HttpTextureSource, TextureFetcher};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, ValueEnum)]
pub enum Mode {
    /// Always create fresh maps
    CreateNew,
    /// Reuse existing maps, import only unknown grids
    Merge,
}

impl From<Mode> for ImportMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::CreateNew => ImportMode::CreateNew,
            Mode::Merge => ImportMode::Merge,
        }
    }
}

#[derive(Args)]
pub struct ImportArgs {
    /// Path to the hmap export file
    #[arg(long)]
    pub file: PathBuf,

    /// Tenant to import into
    #[arg(long)]
    pub tenant: String,

    /// Root directory for rendered tiles
    #[arg(long, default_value = "./tiles")]
    pub storage_root: PathBuf,

    /// Import mode
    #[arg(long, value_enum, default_value = "create-new")]
    pub mode: Mode,

    /// Base URL of the remote texture source
    #[arg(long, default_value = "https://render.havenandhearth.example/res/")]
    pub texture_url: String,

    /// Local texture cache directory
    #[arg(long)]
    pub texture_cache_dir: Option<PathBuf>,

    /// Tenant storage quota in megabytes
    #[arg(long, default_value = "512")]
    pub quota_mb: u64,

    /// Keep only the N largest segments
    #[arg(long, default_value = "3")]
    pub max_segments: usize,
}

pub async fn run(args: ImportArgs) -> Result<(), CliError> {
    let bytes = tokio::fs::read(&args.file).await?;

    let store = Arc::new(MemoryStore::new());
    store
        .upsert_tenant(TenantRecord::new(&args.tenant, args.quota_mb))
        .await
        .map_err(|e| CliError::ImportFailed(e.to_string()))?;

    let source = HttpTextureSource::new(&args.texture_url)
        .map_err(|e| CliError::Invalid(e.to_string()))?;
    let fetcher = Arc::new(TextureFetcher::new(
        source,
        FetcherConfig {
            disk_cache_dir: args.texture_cache_dir.clone(),
            ..FetcherConfig::default()
        },
    ));

    let importer = Importer::new(
        store,
        BlobStorage::new(&args.storage_root),
        fetcher,
        SessionService::new(),
        ImportConfig::default().with_max_segments(args.max_segments),
    );

    // Ctrl-C aborts the run; committed tiles are compensated by the
    // importer's cleanup.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling import");
            signal_token.cancel();
        }
    });

    let progress: hearthmap::import::ProgressCallback = Arc::new(|p: ImportProgress| {
        if p.total_items > 0 {
            println!(
                "  {} [{}/{}] {}",
                p.phase.description(),
                p.current_item,
                p.total_items,
                p.current_item_name.as_deref().unwrap_or("")
            );
        } else {
            println!("{}...", p.phase.description());
        }
    });

    let result = importer
        .import(
            &bytes,
            &args.tenant,
            args.mode.clone().into(),
            Some(progress),
            cancel,
        )
        .await;

    println!();
    println!("maps created:     {}", result.maps_created);
    println!("grids imported:   {}", result.grids_imported);
    println!("grids skipped:    {}", result.grids_skipped);
    println!("tiles written:    {}", result.tiles_written);
    println!("markers imported: {}", result.markers_imported);
    if result.segments_dropped > 0 {
        println!("segments dropped: {}", result.segments_dropped);
    }
    if let Some(diagnostic) = &result.fetch_diagnostic {
        println!("texture warning:  {diagnostic}");
    }
    println!("duration:         {:.1}s", result.duration.as_secs_f64());

    if result.success {
        Ok(())
    } else {
        Err(CliError::ImportFailed(
            result.message.unwrap_or_else(|| "unknown failure".to_string()),
        ))
    }
}
