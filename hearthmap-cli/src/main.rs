//! Hearthmap CLI - command-line interface
//!
//! This binary provides a command-line interface to the Hearthmap
//! library: importing hmap exports, inspecting them, and reconciling
//! tenant storage usage.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use commands::{import, inspect, usage};
use std::process;

#[derive(Parser)]
#[command(name = "hearthmap")]
#[command(version = hearthmap::VERSION)]
#[command(about = "Render map tiles from hmap game exports", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import an hmap export and build its tile pyramid
    Import(import::ImportArgs),
    /// Parse an export and print its structure without importing
    Inspect(inspect::InspectArgs),
    /// Reconcile a tenant's storage usage and write .storage.json
    Usage(usage::UsageArgs),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let _logging = match hearthmap::logging::init_logging(
        hearthmap::logging::default_log_dir(),
        hearthmap::logging::default_log_file(),
    ) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: logging unavailable: {e}");
            None
        }
    };

    let outcome = match args.command {
        Command::Import(args) => import::run(args).await,
        Command::Inspect(args) => inspect::run(args).await,
        Command::Usage(args) => usage::run(args).await,
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
