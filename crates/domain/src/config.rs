//! Environment-driven configuration for the monitor binary.

use std::{env, fmt, time::Duration};

use thiserror::Error;

pub const DEFAULT_CONNECT_API_URL: &str = "https://connect-api.unitedchargers.com";
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

/// Everything the monitor needs to reach the Connect API and its history store.
#[derive(Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    api_base_url: String,
    username: String,
    password: String,
    page_size: usize,
    request_timeout: Duration,
    database_url: String,
    database_max_connections: Option<u32>,
    database_sql_logging: bool,
    max_concurrent_jobs: usize,
}

impl MonitorConfig {
    /// Hydrates `.env` (if present) and reads the process variables. Missing or
    /// malformed entries surface as `ConfigError`.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            api_base_url: get_optional_var("CONNECT_API_URL")
                .unwrap_or_else(|| DEFAULT_CONNECT_API_URL.to_string()),
            username: get_required_var("CONNECT_API_USERNAME")?,
            password: get_required_var("CONNECT_API_PASSWORD")?,
            page_size: parse_positive("CONNECT_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            request_timeout: Duration::from_secs(parse_positive(
                "CONNECT_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            database_url: get_required_var("DATABASE_URL")?,
            database_max_connections: get_optional_var("DATABASE_MAX_CONNECTIONS")
                .map(|_| parse_positive("DATABASE_MAX_CONNECTIONS", 1))
                .transpose()?,
            database_sql_logging: parse_flag("DATABASE_SQL_LOGGING")?,
            max_concurrent_jobs: parse_positive(
                "MONITOR_MAX_CONCURRENT_JOBS",
                DEFAULT_MAX_CONCURRENT_JOBS,
            )?,
        })
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Pool size override; `None` keeps the driver default.
    pub fn database_max_connections(&self) -> Option<u32> {
        self.database_max_connections
    }

    pub fn database_sql_logging(&self) -> bool {
        self.database_sql_logging
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }
}

impl fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("api_base_url", &self.api_base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("page_size", &self.page_size)
            .field("request_timeout", &self.request_timeout)
            .field("database_url", &self.database_url)
            .field("database_max_connections", &self.database_max_connections)
            .field("database_sql_logging", &self.database_sql_logging)
            .field("max_concurrent_jobs", &self.max_concurrent_jobs)
            .finish()
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_positive<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError> + PartialOrd + Default,
{
    let Some(raw) = get_optional_var(key) else {
        return Ok(default);
    };
    let value: T = raw
        .parse()
        .map_err(|source| ConfigError::InvalidNumber { key, source })?;
    if value <= T::default() {
        return Err(ConfigError::NotPositive { key });
    }
    Ok(value)
}

fn parse_flag(key: &'static str) -> Result<bool, ConfigError> {
    match get_optional_var(key) {
        None => Ok(false),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { key, value: raw }),
        },
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("CHARGER_MONITOR_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid boolean `{value}` in `{key}`")]
    InvalidFlag { key: &'static str, value: String },
    #[error("`{key}` must be greater than zero")]
    NotPositive { key: &'static str },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
