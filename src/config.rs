//! ==============================================================================
//! config.rs - Service Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `sensor-api.toml` and the environment overrides.
//!     layering, lowest to highest:
//!     1. built-in defaults
//!     2. optional TOML file ($SENSOR_API_CONFIG, config/, ../config/)
//!     3. environment (MYSQL_HOST, MYSQL_USER, MYSQL_PASS, MYSQL_DB,
//!        MYSQL_PORT, PORT)
//!
//! structure:
//!     - ServerConfig: listen address.
//!     - DatabaseConfig: MySQL credentials and the readings table.
//!     - PoolConfig: connection pool bounds.
//!     - LoggingConfig: default log filter.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::ConfigError;

pub const DEFAULT_MYSQL_PORT: u16 = 3306;
pub const DEFAULT_LISTEN_PORT: u16 = 8080;
pub const CONFIG_PATH_ENV: &str = "SENSOR_API_CONFIG";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub pool: PoolConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Table holding the readings. Must be a plain identifier.
    pub table: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: u32,
    /// Idle connections kept open.
    pub min_connections: u32,
    pub max_lifetime_seconds: u64,
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset (e.g. "info", "sensor_api=debug").
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_LISTEN_PORT,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_MYSQL_PORT,
            user: "data".to_string(),
            password: String::new(),
            database: "buildingData".to_string(),
            table: "IAQ_SEN55".to_string(),
        }
    }
}

// password stays out of logs
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("table", &self.table)
            .finish()
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 25,
            min_connections: 5,
            max_lifetime_seconds: 300,
            acquire_timeout_seconds: 30,
        }
    }
}

impl PoolConfig {
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_seconds)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Result of `ServiceConfig::load_or_default`. Notes are collected rather than
/// logged because the subscriber is installed from the loaded config.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: ServiceConfig,
    pub source: Option<PathBuf>,
    pub notes: Vec<String>,
}

impl ServiceConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load file layer with default fallback, then apply the process environment.
    pub fn load_or_default() -> LoadedConfig {
        let mut paths = Vec::new();
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(explicit));
        }
        paths.push(PathBuf::from("config").join("sensor-api.toml"));
        paths.push(PathBuf::from("..").join("config").join("sensor-api.toml"));

        let mut loaded = Self::load_first(&paths);
        loaded
            .notes
            .extend(loaded.config.apply_env(|key| std::env::var(key).ok()));
        loaded
    }

    fn load_first(paths: &[PathBuf]) -> LoadedConfig {
        let mut notes = Vec::new();

        for path in paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        return LoadedConfig {
                            config,
                            source: Some(path.clone()),
                            notes,
                        };
                    }
                    Err(e) => notes.push(format!("Warning: {}", e)),
                }
            }
        }

        notes.push("No config file found - using defaults".to_string());
        LoadedConfig {
            config: Self::default(),
            source: None,
            notes,
        }
    }

    /// Apply environment overrides through `lookup`. Returns notes about
    /// values that could not be used.
    pub fn apply_env<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut notes = Vec::new();

        if let Some(host) = lookup("MYSQL_HOST") {
            self.database.host = host;
        }
        if let Some(user) = lookup("MYSQL_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("MYSQL_PASS") {
            self.database.password = password;
        }
        if let Some(database) = lookup("MYSQL_DB") {
            self.database.database = database;
        }
        if let Some(raw) = lookup("MYSQL_PORT") {
            self.database.port = raw.trim().parse().unwrap_or_else(|_| {
                notes.push(format!(
                    "MYSQL_PORT {:?} is not a port, using default {}",
                    raw, DEFAULT_MYSQL_PORT
                ));
                DEFAULT_MYSQL_PORT
            });
        }
        if let Some(raw) = lookup("PORT") {
            match raw.trim().parse() {
                Ok(port) => self.server.port = port,
                Err(_) => notes.push(format!(
                    "PORT {:?} is not a port, keeping {}",
                    raw, self.server.port
                )),
            }
        }

        notes
    }

    /// Reject values that would make the service unsafe or unable to start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier(&self.database.table)?;

        if self.pool.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "pool.max_connections must be at least 1".to_string(),
            ));
        }
        if self.pool.min_connections > self.pool.max_connections {
            return Err(ConfigError::Invalid(format!(
                "pool.min_connections ({}) exceeds pool.max_connections ({})",
                self.pool.min_connections, self.pool.max_connections
            )));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Log configuration summary
    pub fn print_summary(&self) {
        info!("┌─────────────────────────────────────────┐");
        info!("│          SENSOR API CONFIGURATION       │");
        info!("├─────────────────────────────────────────┤");
        info!("│ Listen: {}", self.bind_address());
        info!(
            "│ MySQL: {}@{}:{}/{}",
            self.database.user, self.database.host, self.database.port, self.database.database
        );
        info!("│ Table: {}", self.database.table);
        info!(
            "│ Pool: max {} / idle {} / lifetime {}s",
            self.pool.max_connections, self.pool.min_connections, self.pool.max_lifetime_seconds
        );
        info!("│ Log Level: {}", self.logging.level);
        info!("└─────────────────────────────────────────┘");
    }
}

/// The table name is spliced into SQL, so only `[A-Za-z_][A-Za-z0-9_]*` passes.
pub fn validate_identifier(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "table name {:?} is not a plain identifier",
            name
        )))
    }
}
