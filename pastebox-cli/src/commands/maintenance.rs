//! One-shot maintenance commands: schema provisioning and expiry sweeps

use anyhow::{Context, Result};

use pastebox_server::db::migrations;
use pastebox_server::PasteboxConfig;

use super::{open_store, DatabaseArgs};

/// Create the entries table and indexes
pub async fn run_migrate(mut config: PasteboxConfig, args: DatabaseArgs) -> Result<()> {
    args.apply(&mut config);
    let store = open_store(&config).await?;

    migrations::run(store.manager())
        .await
        .context("Failed to run migrations")?;

    store.manager().pool().close().await;
    println!("Migrations complete");
    Ok(())
}

/// Delete expired documents
pub async fn run_sweep(mut config: PasteboxConfig, args: DatabaseArgs) -> Result<()> {
    args.apply(&mut config);
    let store = open_store(&config).await?;

    let removed = store
        .sweep_expired()
        .await
        .context("Failed to sweep expired documents")?;

    store.manager().pool().close().await;
    println!("Removed {} expired document(s)", removed);
    Ok(())
}
