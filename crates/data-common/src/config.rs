//! Configuration types for the data service

use serde::{Deserialize, Serialize};

/// Main configuration for the data service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Database connection configuration
    pub database: DatabaseConfig,
}

/// How a malformed `where` expression is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterPolicy {
    /// Log and fall back to matching every row
    #[default]
    Lenient,
    /// Reject the request with a 400
    Strict,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port for the REST API (default: 3000)
    pub port: u16,
    /// Number of actix workers
    pub workers: usize,
    /// Database schema whose tables are exposed (default: "public")
    pub schema: String,
    /// Upper bound on rows returned by a read; unbounded when unset
    pub max_rows: Option<u64>,
    /// Treatment of malformed filters
    pub filter_policy: FilterPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            workers: 4,
            schema: "public".to_string(),
            max_rows: None,
            filter_policy: FilterPolicy::Lenient,
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the discrete fields
    pub url: Option<String>,
    /// Database host
    pub host: String,
    /// Database port
    pub port: u16,
    /// Database name
    pub database: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Connection pool size
    pub pool_size: usize,
    /// Per-statement deadline in milliseconds
    pub statement_timeout_ms: u64,
    /// Deadline for acquiring a pooled connection in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            pool_size: 10,
            statement_timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
        }
    }
}
