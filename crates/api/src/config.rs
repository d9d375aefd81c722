//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;

use thiserror::Error;

use bloodline_inventory::DEFAULT_BANK_UNITS;
use bloodline_observability::LogFormat;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// `None` means the binary falls back to an insecure dev secret.
    pub jwt_secret: Option<String>,
    /// Postgres connection string; the in-memory store is used when unset.
    pub database_url: Option<String>,
    /// Units given to each blood group when a bank is provisioned.
    pub default_bank_units: u32,
    pub log_format: LogFormat,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let default_bank_units = match get("DEFAULT_BANK_UNITS") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|e| {
                ConfigError::Invalid {
                    key: "DEFAULT_BANK_UNITS",
                    reason: format!("{raw:?}: {e}"),
                }
            })?,
            None => DEFAULT_BANK_UNITS,
        };

        let log_format = match get("LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().map_err(|reason| ConfigError::Invalid {
                key: "LOG_FORMAT",
                reason,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind_addr,
            jwt_secret: get("JWT_SECRET"),
            database_url: get("DATABASE_URL"),
            default_bank_units,
            log_format,
        })
    }
}
