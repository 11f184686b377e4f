//! `hearthmap inspect` - parse an export and print its structure.

use crate::error::CliError;
use clap::Args;
use hearthmap::hmap;
use std::path::PathBuf;

#[derive(Args)]
pub struct InspectArgs {
    /// Path to the hmap export file
    #[arg(long)]
    pub file: PathBuf,
}

pub async fn run(args: InspectArgs) -> Result<(), CliError> {
    let bytes = tokio::fs::read(&args.file).await?;
    let doc = hmap::parse(&bytes)?;

    println!("tilesets: {}", doc.tilesets.len());
    for (index, name) in doc.tilesets.iter().enumerate() {
        println!("  [{index}] {name}");
    }

    let segments = doc.segments();
    println!("segments: {}", segments.len());
    for segment in &segments {
        println!("  segment {} - {} grids", segment.id, segment.grid_count);
    }

    let with_heights = doc.grids.iter().filter(|g| g.heights.is_some()).count();
    println!(
        "grids: {} total, {} with height data",
        doc.grids.len(),
        with_heights
    );
    println!("markers: {}", doc.markers.len());

    Ok(())
}
