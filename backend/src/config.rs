//! Configuration management for the inventory ledger server
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with CIB_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::{AdjustmentMode, MissingAssemblyPolicy, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT verification configuration
    pub jwt: JwtConfig,

    /// Ledger behaviour
    pub ledger: LedgerConfig,

    /// Persistence retry policy
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

/// Which persistence adapter backs the server
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    /// In-process store; state is lost on restart
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,

    /// PostgreSQL connection URL
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key used to verify bearer tokens
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Interpretation of adjustment quantities
    pub adjustment_mode: AdjustmentMode,

    /// Takeoff behaviour when an estimate references an unknown assembly
    pub missing_assembly_policy: MissingAssemblyPolicy,

    /// Compare-and-swap attempts before a level update reports a conflict
    pub max_cas_retries: u32,

    pub history_default_limit: u32,

    pub history_max_limit: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceConfig {
    /// Attempts per storage call, including the first
    pub retry_max_attempts: u32,

    /// Backoff before the second attempt; doubles each retry
    pub retry_base_backoff_ms: u64,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("CIB_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.backend", "postgres")?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("jwt.secret", "development-secret-key")?
            .set_default("ledger.adjustment_mode", "delta")?
            .set_default("ledger.missing_assembly_policy", "fail")?
            .set_default("ledger.max_cas_retries", 5)?
            .set_default("ledger.history_default_limit", i64::from(DEFAULT_HISTORY_LIMIT))?
            .set_default("ledger.history_max_limit", i64::from(MAX_HISTORY_LIMIT))?
            .set_default("persistence.retry_max_attempts", 4)?
            .set_default("persistence.retry_base_backoff_ms", 120)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (CIB_ prefix)
            .add_source(
                Environment::with_prefix("CIB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for Config {
    /// In-process configuration with no external services
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            jwt: JwtConfig::default(),
            ledger: LedgerConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            url: String::new(),
            max_connections: 10,
            min_connections: 2,
            acquire_timeout_secs: 30,
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "development-secret-key".to_string(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            adjustment_mode: AdjustmentMode::Delta,
            missing_assembly_policy: MissingAssemblyPolicy::Fail,
            max_cas_retries: 5,
            history_default_limit: DEFAULT_HISTORY_LIMIT,
            history_max_limit: MAX_HISTORY_LIMIT,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            retry_max_attempts: 4,
            retry_base_backoff_ms: 120,
        }
    }
}
