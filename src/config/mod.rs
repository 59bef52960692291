/// Configuration management for the Stepway runtime
///
/// Handles server configuration, the definition repository, database
/// connections, engine limits and session lifetime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Definition repository configuration
    pub definitions: DefinitionsConfig,
    /// Named business database connections
    pub databases: DatabaseConfig,
    /// Interpreter limits
    pub engine: EngineConfig,
    /// Session lifetime
    pub session: SessionConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionsConfig {
    /// SQLite file holding application and module definitions
    pub database_path: String,
    /// Load only applications flagged for activation at startup
    pub activate_on_start: bool,
}

/// Connection-string table used by database actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Key: connection name (a `DEFAULT` entry is the fallback), Value: URL
    pub connections: HashMap<String, String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub max_call_depth: usize,
    pub max_iterations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a session is swept
    pub max_age_secs: u64,
    pub sweep_interval_secs: u64,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl SessionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Sweep period, never shorter than one second
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Parse `NAME=url;NAME2=url` into a connection table
///
/// Names are uppercased; entries without `=` or with an empty side are skipped.
pub fn parse_connections(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|entry| {
            let (name, url) = entry.split_once('=')?;
            let (name, url) = (name.trim(), url.trim());
            (!name.is_empty() && !url.is_empty()).then(|| (name.to_uppercase(), url.to_string()))
        })
        .collect()
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("STEPWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("STEPWAY_PORT", 3004),
            },
            definitions: DefinitionsConfig {
                database_path: std::env::var("STEPWAY_DEFINITIONS_DB")
                    .unwrap_or_else(|_| "data/definitions.db".to_string()),
                activate_on_start: env_or("STEPWAY_ACTIVATE_ON_START", true),
            },
            databases: DatabaseConfig {
                connections: std::env::var("STEPWAY_CONNECTIONS")
                    .map(|raw| parse_connections(&raw))
                    .unwrap_or_default(),
                max_connections: env_or("STEPWAY_DB_MAX_CONNECTIONS", 5),
                acquire_timeout_secs: env_or("STEPWAY_DB_ACQUIRE_TIMEOUT_SECS", 10),
            },
            engine: EngineConfig {
                max_call_depth: env_or("STEPWAY_MAX_CALL_DEPTH", 20),
                max_iterations: env_or("STEPWAY_MAX_ITERATIONS", 10_000),
            },
            session: SessionConfig {
                max_age_secs: env_or("STEPWAY_SESSION_MAX_AGE_SECS", 3600),
                sweep_interval_secs: env_or("STEPWAY_SESSION_SWEEP_SECS", 300),
            },
        }
    }
}
