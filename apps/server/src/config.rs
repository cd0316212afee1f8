//! Static server configuration
//!
//! Loaded once at startup from layered sources (later sources win):
//! 1. built-in defaults
//! 2. `config/default.toml` (optional)
//! 3. the file passed via `--config` or `VELLUM_CONFIG` (optional)
//! 4. environment variables prefixed `VELLUM__`, e.g. `VELLUM__SERVER__PORT=9000`

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub batch: BatchConfig,
    pub layers: LayersConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_request_body_size: usize,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_request_body_size: 10 * 1024 * 1024,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// PostgreSQL connection string, required for the `postgres` backend.
    pub url: Option<String>,
    /// Database ids served under `/{db}`.
    pub databases: Vec<String>,
    pub pool_min_size: u32,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
    pub run_migrations: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            url: None,
            databases: vec!["db".to_string()],
            pool_min_size: 1,
            pool_max_size: 10,
            pool_timeout_seconds: 30,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When disabled every caller acts as `root_user`.
    pub enabled: bool,
    /// Reject requests without a bearer token instead of treating them as anonymous.
    pub required: bool,
    /// Shared HS256 secret used to validate bearer tokens.
    pub jwt_secret: Option<String>,
    pub issuer: Option<String>,
    pub root_user: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            required: false,
            jwt_secret: None,
            issuer: None,
            root_user: "root".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Upper bound on items accepted in one `@batch` call.
    pub max_items: usize,
    /// Total attempts (first try included) for a sub-request hitting a write conflict.
    pub conflict_max_attempts: u32,
    /// Constant delay between conflict retries.
    pub conflict_backoff_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_items: 500,
            conflict_max_attempts: 3,
            conflict_backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayersConfig {
    /// Capability layers installed in this deployment.
    pub installed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub file_enabled: bool,
    pub file_directory: String,
    pub file_prefix: String,
    /// daily, hourly, minutely or never
    pub file_rotation: String,
    pub service_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_enabled: false,
            file_directory: "logs".to_string(),
            file_prefix: "vellum".to_string(),
            file_rotation: "daily".to_string(),
            service_name: "vellum".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default locations and the environment.
    pub fn load() -> anyhow::Result<Self> {
        let explicit = std::env::var("VELLUM_CONFIG").ok();
        Self::load_from(explicit.as_deref().map(Path::new))
    }

    /// Load configuration, layering `path` (if any) over `config/default.toml`.
    pub fn load_from(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        // Every section is `#[serde(default)]`, so absent keys fall back to `Default`.
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("VELLUM")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("storage.databases")
                    .with_list_parse_key("layers.installed")
                    .with_list_parse_key("server.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch.conflict_max_attempts == 0 {
            return Err("batch.conflict_max_attempts must be at least 1".to_string());
        }
        if self.batch.max_items == 0 {
            return Err("batch.max_items must be greater than 0".to_string());
        }
        if self.storage.databases.is_empty() {
            return Err("storage.databases must name at least one database".to_string());
        }
        if self.storage.backend == StorageBackend::Postgres && self.storage.url.is_none() {
            return Err("storage.url is required for the postgres backend".to_string());
        }
        if self.auth.enabled && self.auth.jwt_secret.is_none() {
            return Err("auth.jwt_secret is required when auth is enabled".to_string());
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.server.host, self.server.port).parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch.conflict_max_attempts, 3);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_validate_rejects_postgres_without_url() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Postgres;
        assert!(config.validate().is_err());

        config.storage.url = Some("postgres://localhost/vellum".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_auth_without_secret() {
        let mut config = Config::default();
        config.auth.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = Config::default();
        config.batch.conflict_max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
