//! Command implementations for the pastebox CLI

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use pastebox_server::db::ConnectionManager;
use pastebox_server::{DocumentStore, PasteboxConfig};

pub mod get;
pub mod maintenance;
pub mod serve;

// Re-export dispatcher functions for flat access from main.rs
pub use get::run_get;
pub use maintenance::{run_migrate, run_sweep};
pub use serve::run_serve;

/// Database selection shared by the store-facing commands
#[derive(Args, Debug, Clone, Default)]
pub struct DatabaseArgs {
    /// Database URL (overrides config/environment)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

impl DatabaseArgs {
    pub fn apply(&self, config: &mut PasteboxConfig) {
        if let Some(url) = &self.database_url {
            config.storage.database_url = Some(url.clone());
        }
    }
}

/// Defaults, then the config file, then environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<PasteboxConfig> {
    let mut config = PasteboxConfig::load(path).context("Failed to load config")?;
    config
        .apply_env()
        .context("Invalid configuration in environment")?;
    Ok(config)
}

/// Connect to the configured database and wrap it in a store.
pub async fn open_store(config: &PasteboxConfig) -> Result<DocumentStore> {
    let database_url = config.storage.database_url()?;

    let manager = ConnectionManager::connect(database_url, &config.storage.manager_settings())
        .await
        .context("Failed to connect to database")?;
    tracing::debug!(backend = ?manager.kind(), "Connected to database");

    Ok(DocumentStore::new(manager, config.storage.store_settings()))
}
