//! Axum server setup
//!
//! Server skeleton with:
//! - Localhost-only CORS by default
//! - Body size limit
//! - Tracing middleware
//! - Graceful shutdown on SIGTERM/Ctrl+C
//! - Optional expired-document sweeper tied to the server's lifetime

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::routes;
use crate::config::PasteboxConfig;
use crate::store::DocumentStore;
use crate::sweeper;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host name or address to bind (default: localhost)
    pub host: String,

    /// Port to bind (default: 7777)
    pub port: u16,

    /// Allow permissive CORS (default: false = localhost only)
    ///
    /// WARNING: Setting this to true allows any origin.
    pub cors_permissive: bool,

    /// Largest accepted request body in bytes
    pub max_body_bytes: usize,

    /// Run the sweeper at this interval; `None` disables it
    pub sweep_interval: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&PasteboxConfig::default())
    }
}

impl From<&PasteboxConfig> for ServerConfig {
    fn from(config: &PasteboxConfig) -> Self {
        Self {
            host: config.http.host.clone(),
            port: config.http.port,
            cors_permissive: config.http.cors_permissive,
            max_body_bytes: config.http.max_body_bytes,
            sweep_interval: config.sweeper.enabled.then(|| config.sweeper.interval()),
        }
    }
}

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: DocumentStore,
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = ["localhost", "127.0.0.1"]
        .iter()
        .filter_map(|host| format!("http://{}:{}", host, config.port).parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the application router with all routes and layers.
pub fn build_router(store: DocumentStore, config: &ServerConfig) -> Router {
    let state = AppState { store };

    Router::new()
        .merge(routes::health::router())
        .merge(routes::documents::router())
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Run the HTTP server until a shutdown signal arrives.
///
/// # Example
///
/// ```ignore
/// let manager = ConnectionManager::connect(&database_url, &settings).await?;
/// let store = DocumentStore::new(manager, StoreSettings::default());
/// run_server(store, ServerConfig::default()).await?;
/// ```
pub async fn run_server(store: DocumentStore, config: ServerConfig) -> Result<(), ServerError> {
    let sweeper = config
        .sweep_interval
        .map(|interval| sweeper::spawn(store.clone(), interval));

    let app = build_router(store.clone(), &config);

    // Bind listener
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    // Run with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.stop().await;
    }
    store.manager().pool().close().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
