//! Process configuration read from environment variables.

use thiserror::Error;

use crate::ledger_store::query::DEFAULT_MAX_PAGE_LIMIT;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// Which ledger backend to wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub bind_addr: String,
    pub storage: StorageBackend,
    /// Upper bound applied to `limit` on history queries.
    pub query_max_limit: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            storage: StorageBackend::InMemory,
            query_max_limit: DEFAULT_MAX_PAGE_LIMIT,
        }
    }
}

impl LedgerConfig {
    /// Read configuration from the process environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `BIND_ADDR` | `0.0.0.0:8080` |
    /// | `USE_PERSISTENT_STORES` | `false` |
    /// | `DATABASE_URL` | required when persistent |
    /// | `DATABASE_MAX_CONNECTIONS` | `10` |
    /// | `QUERY_MAX_LIMIT` | `1000` |
    ///
    /// The in-memory backend starts with an empty product catalog and no way to
    /// fill it over HTTP; set `USE_PERSISTENT_STORES` to serve real products.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let use_persistent = match lookup("USE_PERSISTENT_STORES") {
            Some(raw) => parse_bool("USE_PERSISTENT_STORES", &raw)?,
            None => false,
        };

        let storage = if use_persistent {
            let database_url = lookup("DATABASE_URL")
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let max_connections = parse_u32(
                "DATABASE_MAX_CONNECTIONS",
                lookup("DATABASE_MAX_CONNECTIONS"),
                DEFAULT_MAX_CONNECTIONS,
            )?;
            StorageBackend::Postgres {
                database_url,
                max_connections,
            }
        } else {
            StorageBackend::InMemory
        };

        let query_max_limit = parse_u32("QUERY_MAX_LIMIT", lookup("QUERY_MAX_LIMIT"), DEFAULT_MAX_PAGE_LIMIT)?;

        Ok(Self {
            bind_addr,
            storage,
            query_max_limit,
        })
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key,
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn parse_u32(key: &'static str, raw: Option<String>, default: u32) -> Result<u32, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value = raw.trim().parse::<u32>().map_err(|e| ConfigError::InvalidValue {
        key,
        message: e.to_string(),
    })?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
