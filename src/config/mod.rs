/// Configuration management for the blockflow engine
///
/// Handles server configuration, persistence location, execution tuning and
/// collaborator endpoints. Every field can be overridden through environment
/// variables for container deployment.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Persistence configuration
    pub database: DatabaseConfig,
    /// Execution coordinator tuning
    pub engine: EngineConfig,
    /// External collaborator endpoints used by block handlers
    pub services: ServicesConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding `blockflow.db` (workflows and execution state)
    pub data_dir: String,
    /// Which execution state store backs the coordinator
    pub execution_store: StoreBackend,
}

/// Execution state store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!("Unknown execution store: {}", other)),
        }
    }
}

/// What the coordinator does when upstream data scores below the acceptance threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaPolicy {
    /// Log a warning and dispatch the node anyway
    Warn,
    /// Fail the node before its handler runs
    Halt,
}

impl FromStr for SchemaPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "halt" => Ok(Self::Halt),
            other => Err(format!("Unknown schema policy: {}", other)),
        }
    }
}

/// Execution coordinator tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of nodes dispatched concurrently within one run
    pub max_parallel_nodes: usize,
    /// Time budget handed to handlers for their external calls
    pub handler_timeout_secs: u64,
    /// Minimum compatibility score accepted for declared input schemas
    pub schema_acceptance_threshold: f64,
    /// Reaction to a score below the threshold
    pub schema_policy: SchemaPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 4,
            handler_timeout_secs: 30,
            schema_acceptance_threshold: 0.5,
            schema_policy: SchemaPolicy::Warn,
        }
    }
}

/// External collaborator endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Base URL of the HTTP price feed (`GET {base}/price/{asset}`)
    pub price_feed_url: Option<String>,
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        let engine_defaults = EngineConfig::default();

        Self {
            server: ServerConfig {
                host: std::env::var("BLOCKFLOW_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("BLOCKFLOW_PORT", 3004),
            },
            database: DatabaseConfig {
                data_dir: std::env::var("BLOCKFLOW_DATA_DIR")
                    .unwrap_or_else(|_| "data".to_string()),
                execution_store: env_or("BLOCKFLOW_EXECUTION_STORE", StoreBackend::Sqlite),
            },
            engine: EngineConfig {
                max_parallel_nodes: env_or(
                    "BLOCKFLOW_MAX_PARALLEL_NODES",
                    engine_defaults.max_parallel_nodes,
                )
                .max(1),
                handler_timeout_secs: env_or(
                    "BLOCKFLOW_HANDLER_TIMEOUT_SECS",
                    engine_defaults.handler_timeout_secs,
                ),
                schema_acceptance_threshold: env_or(
                    "BLOCKFLOW_SCHEMA_THRESHOLD",
                    engine_defaults.schema_acceptance_threshold,
                )
                .clamp(0.0, 1.0),
                schema_policy: env_or("BLOCKFLOW_SCHEMA_POLICY", engine_defaults.schema_policy),
            },
            services: ServicesConfig {
                price_feed_url: std::env::var("BLOCKFLOW_PRICE_FEED_URL").ok(),
            },
        }
    }
}

impl Config {
    /// Path of the SQLite database file inside the data directory
    pub fn database_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.database.data_dir).join("blockflow.db")
    }
}

/// Read and parse an env var, falling back to the default when unset or invalid
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
