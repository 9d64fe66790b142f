//! Layered configuration
//!
//! Built-in defaults, then an optional TOML file, then environment
//! variables. The CLI applies its own flags last.
//!
//! ```toml
//! [storage]
//! database_url = "postgres://localhost/pastebox"
//! retention_secs = 100000
//!
//! [http]
//! port = 7777
//!
//! [sweeper]
//! enabled = true
//! interval_secs = 3600
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::{ManagerSettings, PoolSettings};
use crate::store::StoreSettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file (invalid TOML): {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },

    #[error("database url not set; use --database-url, DATABASE_URL, or [storage] database_url")]
    MissingDatabaseUrl,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasteboxConfig {
    pub storage: StorageConfig,
    pub http: HttpConfig,
    pub sweeper: SweeperConfig,
}

/// Backing store and pool limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    pub statement_timeout_ms: u64,
    /// Default lifetime of a document stored without an explicit expiration
    pub retention_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            acquire_timeout_ms: 5_000,
            statement_timeout_ms: 10_000,
            retention_secs: 100_000,
        }
    }
}

impl StorageConfig {
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingDatabaseUrl)
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            pool: PoolSettings {
                max_connections: self.max_connections.max(1),
                acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
                lazy: false,
            },
            statement_timeout: Duration::from_millis(self.statement_timeout_ms),
        }
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            retention: Duration::from_secs(self.retention_secs),
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body
    pub max_body_bytes: usize,
    /// Allow any origin instead of localhost only
    pub cors_permissive: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 7777,
            max_body_bytes: 1024 * 1024,
            cors_permissive: false,
        }
    }
}

/// Expired-row sweeper settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 3_600,
        }
    }
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl PasteboxConfig {
    /// Default config file location: ~/.pastebox/config.toml
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".pastebox").join("config.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path`, or from the default location when it exists.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Self::from_toml_str(&content)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup`: `DATABASE_URL`, `HOST`, `PORT`,
    /// `PASTEBOX_RETENTION_SECS`.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("DATABASE_URL") {
            self.storage.database_url = Some(url);
        }
        if let Some(host) = lookup("HOST") {
            self.http.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.http.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { var: "PORT", value: port })?;
        }
        if let Some(secs) = lookup("PASTEBOX_RETENTION_SECS") {
            self.storage.retention_secs = secs.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "PASTEBOX_RETENTION_SECS",
                value: secs,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let config = PasteboxConfig::default();
        assert_eq!(config.storage.retention_secs, 100_000);
        assert_eq!(config.storage.max_connections, 5);
        assert_eq!(config.http.port, 7777);
        assert_eq!(config.http.host, "localhost");
        assert!(!config.sweeper.enabled);
        assert!(matches!(
            config.storage.database_url(),
            Err(ConfigError::MissingDatabaseUrl)
        ));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PasteboxConfig::from_toml_str(
            r#"
            [storage]
            database_url = "postgres://localhost/pastebox"
            retention_secs = 60

            [sweeper]
            enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.database_url().unwrap(), "postgres://localhost/pastebox");
        assert_eq!(config.storage.store_settings().retention, Duration::from_secs(60));
        assert_eq!(config.storage.acquire_timeout_ms, 5_000);
        assert!(config.sweeper.enabled);
        assert_eq!(config.sweeper.interval(), Duration::from_secs(3_600));
        assert_eq!(config.http, HttpConfig::default());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(matches!(
            PasteboxConfig::from_toml_str("[storage\nport = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn environment_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("DATABASE_URL", "sqlite://pastes.db"),
            ("PORT", "8080"),
            ("PASTEBOX_RETENTION_SECS", "30"),
        ]
        .into_iter()
        .collect();

        let mut config = PasteboxConfig::default();
        config
            .apply_env_from(|var| env.get(var).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.storage.database_url().unwrap(), "sqlite://pastes.db");
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.storage.retention_secs, 30);
        assert_eq!(config.http.host, "localhost");
    }

    #[test]
    fn bad_port_is_reported() {
        let mut config = PasteboxConfig::default();
        let err = config
            .apply_env_from(|var| (var == "PORT").then(|| "seventy".to_string()))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid value for PORT: 'seventy'");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = PasteboxConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn manager_settings_from_storage() {
        let storage = StorageConfig {
            max_connections: 0,
            acquire_timeout_ms: 250,
            statement_timeout_ms: 1_500,
            ..StorageConfig::default()
        };
        let settings = storage.manager_settings();
        assert_eq!(settings.pool.max_connections, 1);
        assert_eq!(settings.pool.acquire_timeout, Duration::from_millis(250));
        assert_eq!(settings.statement_timeout, Duration::from_millis(1_500));
    }
}
