//! HTTP server command
//!
//! Runs the pastebox API until Ctrl+C or SIGTERM.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;

use pastebox_server::db::migrations;
use pastebox_server::http::{run_server, ServerConfig};
use pastebox_server::PasteboxConfig;

use super::{open_store, DatabaseArgs};

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (default: localhost:7777, or [http] in config)
    #[arg(long, short = 'b')]
    pub bind: Option<SocketAddr>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Run the expired-document sweeper in the background
    #[arg(long)]
    pub sweep: bool,

    /// Skip creating the entries table on startup
    #[arg(long)]
    pub no_migrate: bool,

    #[command(flatten)]
    pub db: DatabaseArgs,
}

impl ServeArgs {
    fn apply(&self, config: &mut PasteboxConfig) {
        self.db.apply(config);
        if let Some(addr) = self.bind {
            config.http.host = addr.ip().to_string();
            config.http.port = addr.port();
        }
        if self.cors_permissive {
            config.http.cors_permissive = true;
        }
        if self.sweep {
            config.sweeper.enabled = true;
        }
    }
}

/// Run the HTTP server
pub async fn run_serve(mut config: PasteboxConfig, args: ServeArgs) -> Result<()> {
    args.apply(&mut config);

    let store = open_store(&config).await?;
    if !args.no_migrate {
        migrations::run(store.manager())
            .await
            .context("Failed to run migrations")?;
    }

    tracing::info!(
        host = %config.http.host,
        port = config.http.port,
        retention_secs = store.retention().as_secs(),
        "Starting pastebox server"
    );

    // Run server (blocks until shutdown)
    run_server(store, ServerConfig::from(&config))
        .await
        .context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = ServeArgs {
            bind: Some("0.0.0.0:8080".parse().unwrap()),
            cors_permissive: true,
            sweep: true,
            no_migrate: false,
            db: DatabaseArgs {
                database_url: Some("sqlite://pastes.db".into()),
            },
        };
        let mut config = PasteboxConfig::default();
        args.apply(&mut config);

        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.http.port, 8080);
        assert!(config.http.cors_permissive);
        assert!(config.sweeper.enabled);
        assert_eq!(config.storage.database_url().unwrap(), "sqlite://pastes.db");
    }

    #[test]
    fn absent_flags_keep_config() {
        let args = ServeArgs {
            bind: None,
            cors_permissive: false,
            sweep: false,
            no_migrate: false,
            db: DatabaseArgs::default(),
        };
        let mut config = PasteboxConfig::default();
        config.sweeper.enabled = true;
        args.apply(&mut config);

        assert_eq!(config.http.port, 7777);
        assert!(config.sweeper.enabled);
        assert!(config.storage.database_url.is_none());
    }
}
