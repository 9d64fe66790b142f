//! pastebox CLI - serve and maintain a pastebox document store
//!
//! - `serve`: run the HTTP API
//! - `migrate`: create the entries table
//! - `sweep`: delete expired documents once
//! - `get`: print a document from the store

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod tracing_setup;

use tracing_setup::TracingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "pastebox",
    author,
    version,
    about = "Keyed paste store with expiring documents",
    long_about = "Store and serve text documents under caller-supplied keys. Documents expire \
                  after a retention window unless stored with an explicit expiration."
)]
struct Cli {
    /// Config file (default: ~/.pastebox/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(commands::serve::ServeArgs),
    /// Create the entries table and indexes
    Migrate(commands::DatabaseArgs),
    /// Delete expired documents once and exit
    Sweep(commands::DatabaseArgs),
    /// Print a live document as JSON (or raw text)
    Get(commands::get::GetArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    tracing_setup::init(&TracingConfig { debug: cli.debug }).ok();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve(args) => commands::run_serve(config, args).await?,
        Commands::Migrate(args) => commands::run_migrate(config, args).await?,
        Commands::Sweep(args) => commands::run_sweep(config, args).await?,
        Commands::Get(args) => commands::run_get(config, args).await?,
    }
    Ok(())
}
