//! Database connection pool management
//!
//! The backend is picked from the URL scheme: `postgres://` / `postgresql://`
//! for PostgreSQL, `sqlite:` for a local SQLite file. Both pools are built
//! with explicit size and acquire-timeout limits.

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{PgPool, SqlitePool};

use super::error::ConnectionError;

/// Default maximum connections for the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default time a caller waits for a free connection.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool sizing and timeout limits.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Connect lazily instead of opening (and verifying) one connection up front.
    pub lazy: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            lazy: false,
        }
    }
}

/// Supported backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Postgres,
    Sqlite,
}

impl BackendKind {
    /// Detect the backend from a connection URL.
    pub fn from_url(url: &str) -> Result<Self, ConnectionError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else {
            let scheme = url.split(':').next().unwrap_or_default();
            Err(ConnectionError::UnsupportedUrl(scheme.to_owned()))
        }
    }
}

/// A connection pool for one of the supported backends.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Debug, Clone)]
pub enum BackendPool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl BackendPool {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Postgres(_) => BackendKind::Postgres,
            Self::Sqlite(_) => BackendKind::Sqlite,
        }
    }

    /// Number of connections currently open (idle + leased).
    pub fn size(&self) -> u32 {
        match self {
            Self::Postgres(pool) => pool.size(),
            Self::Sqlite(pool) => pool.size(),
        }
    }

    /// Number of open connections sitting idle in the pool.
    pub fn num_idle(&self) -> usize {
        match self {
            Self::Postgres(pool) => pool.num_idle(),
            Self::Sqlite(pool) => pool.num_idle(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Postgres(pool) => pool.is_closed(),
            Self::Sqlite(pool) => pool.is_closed(),
        }
    }

    /// Close the pool, waiting for leased connections to come back.
    pub async fn close(&self) {
        match self {
            Self::Postgres(pool) => pool.close().await,
            Self::Sqlite(pool) => pool.close().await,
        }
    }
}

/// Create a connection pool with default limits.
///
/// # Example
///
/// ```ignore
/// let pool = create_pool("postgres://localhost/pastebox").await?;
/// ```
pub async fn create_pool(database_url: &str) -> Result<BackendPool, ConnectionError> {
    create_pool_with_options(database_url, &PoolSettings::default()).await
}

/// Create a connection pool with explicit limits.
pub async fn create_pool_with_options(
    database_url: &str,
    settings: &PoolSettings,
) -> Result<BackendPool, ConnectionError> {
    let unreachable = |e: sqlx::Error| ConnectionError::from_acquire(e, settings.acquire_timeout);

    match BackendKind::from_url(database_url)? {
        BackendKind::Postgres => {
            let options = PgConnectOptions::from_str(database_url).map_err(unreachable)?;
            let builder = PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .acquire_timeout(settings.acquire_timeout);

            let pool = if settings.lazy {
                builder.connect_lazy_with(options)
            } else {
                builder.connect_with(options).await.map_err(unreachable)?
            };
            Ok(BackendPool::Postgres(pool))
        }
        BackendKind::Sqlite => {
            let options = SqliteConnectOptions::from_str(database_url)
                .map_err(unreachable)?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                // Concurrent writers wait for the lock instead of failing with SQLITE_BUSY
                .busy_timeout(Duration::from_secs(5))
                .synchronous(SqliteSynchronous::Normal);
            let builder = SqlitePoolOptions::new()
                .max_connections(settings.max_connections)
                .acquire_timeout(settings.acquire_timeout);

            let pool = if settings.lazy {
                builder.connect_lazy_with(options)
            } else {
                builder.connect_with(options).await.map_err(unreachable)?
            };
            Ok(BackendPool::Sqlite(pool))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn detects_backend_from_scheme() {
        assert_eq!(
            BackendKind::from_url("postgres://localhost/pastebox").unwrap(),
            BackendKind::Postgres
        );
        assert_eq!(
            BackendKind::from_url("postgresql://user@db/pastes").unwrap(),
            BackendKind::Postgres
        );
        assert_eq!(
            BackendKind::from_url("sqlite:///tmp/pastes.db").unwrap(),
            BackendKind::Sqlite
        );
    }

    #[test]
    fn rejects_unknown_scheme() {
        let err = BackendKind::from_url("mysql://localhost/pastes").unwrap_err();
        assert!(matches!(err, ConnectionError::UnsupportedUrl(ref s) if s == "mysql"));
    }

    #[tokio::test]
    async fn sqlite_pool_opens_eagerly() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("pool.db").display());

        let pool = create_pool(&url).await.expect("pool creation failed");

        assert_eq!(pool.kind(), BackendKind::Sqlite);
        assert!(pool.size() >= 1);
        pool.close().await;
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn lazy_pool_opens_nothing() {
        let settings = PoolSettings {
            lazy: true,
            ..PoolSettings::default()
        };
        let pool = create_pool_with_options("postgres://pastebox@127.0.0.1:1/pastebox", &settings)
            .await
            .expect("lazy pool should not connect");

        assert_eq!(pool.size(), 0);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn postgres_pool_acquires_connection() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url).await.expect("pool creation failed");

        assert_eq!(pool.kind(), BackendKind::Postgres);
        assert!(pool.size() >= 1);
    }
}
