//! Application configuration.
//!
//! # Environment Variables
//!
//! - `APP_HOST`: bind address (default `0.0.0.0`)
//! - `APP_PORT`: bind port (default `3000`)
//! - `STORAGE_MODE`: `in_memory` (default) | `postgres`
//! - `DATABASE_URL`: `PostgreSQL` connection URL (required when `STORAGE_MODE=postgres`)
//! - `SEED_USERS`: `name:token,...` users created at startup in `in_memory` mode
//! - `LOG_FORMAT`: `pretty` (default) | `json`
//!
//! A `.env` file in the working directory is loaded first when present.

use std::env;
use std::str::FromStr;

use thiserror::Error;

use crate::domain::NewUser;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;

// =============================================================================
// Configuration Types
// =============================================================================

/// Storage backend for users, tasks and comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Process-local tables, lost on restart.
    #[default]
    InMemory,
    /// `PostgreSQL` storage for production use.
    Postgres,
}

impl FromStr for StorageMode {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            _ => Err(ConfigurationError::InvalidStorageMode(value.to_string())),
        }
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(ConfigurationError::InvalidLogFormat(value.to_string())),
        }
    }
}

/// Everything `main` needs to start the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_mode: StorageMode,
    /// `PostgreSQL` connection URL (required when `storage_mode` is `Postgres`).
    pub database_url: Option<String>,
    /// Users created at startup when running in memory.
    pub seed_users: Vec<NewUser>,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            storage_mode: StorageMode::default(),
            database_url: None,
            seed_users: Vec::new(),
            log_format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if a variable holds an invalid value or
    /// `DATABASE_URL` is missing when `STORAGE_MODE=postgres`.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        // A missing .env file is the normal case outside local development.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Empty and whitespace-only values are treated as absent.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::from_env`].
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigurationError> {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let port = match read("APP_PORT") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigurationError::InvalidPort(value))?,
            None => DEFAULT_PORT,
        };

        let config = Self {
            host: read("APP_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            storage_mode: read("STORAGE_MODE")
                .map(|value| value.parse::<StorageMode>())
                .transpose()?
                .unwrap_or_default(),
            database_url: read("DATABASE_URL"),
            seed_users: read("SEED_USERS")
                .map(|value| parse_seed_users(&value))
                .transpose()?
                .unwrap_or_default(),
            log_format: read("LOG_FORMAT")
                .map(|value| value.parse::<LogFormat>())
                .transpose()?
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::MissingDatabaseUrl` if the `PostgreSQL`
    /// backend is selected without a URL.
    pub const fn validate(&self) -> Result<(), ConfigurationError> {
        if matches!(self.storage_mode, StorageMode::Postgres) && self.database_url.is_none() {
            return Err(ConfigurationError::MissingDatabaseUrl);
        }
        Ok(())
    }

    /// `host:port` to bind the listener to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parses `alice:token-a,bob:token-b`.
fn parse_seed_users(value: &str) -> Result<Vec<NewUser>, ConfigurationError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((username, token)) if !username.is_empty() && !token.is_empty() => {
                Ok(NewUser::new(username, token))
            }
            _ => Err(ConfigurationError::InvalidSeedUser(entry.to_string())),
        })
        .collect()
}

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid storage mode: '{0}'. Expected 'in_memory' or 'postgres'")]
    InvalidStorageMode(String),

    #[error("Invalid log format: '{0}'. Expected 'pretty' or 'json'")]
    InvalidLogFormat(String),

    #[error("Invalid port: '{0}'")]
    InvalidPort(String),

    #[error("Invalid seed user: '{0}'. Expected 'name:token'")]
    InvalidSeedUser(String),

    /// Missing `DATABASE_URL` when storage mode is Postgres.
    #[error("DATABASE_URL environment variable is required when STORAGE_MODE=postgres")]
    MissingDatabaseUrl,
}

// =============================================================================
// Tests
// =============================================================================
