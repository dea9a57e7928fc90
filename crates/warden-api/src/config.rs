//! Server configuration.
//!
//! Sources, later ones overriding earlier ones: built-in defaults, an
//! optional YAML file named by `WARDEN_CONFIG`, then environment variables.

use std::net::SocketAddr;

use serde::Deserialize;
use warden_event_store::config::EventStoreConfig;

use crate::error::AppError;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `PostgreSQL` connection string. Required.
    pub database_url: String,
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Connection pool size.
    pub max_connections: u32,
    /// Log output format.
    pub log_format: LogFormat,
    /// Push retry settings.
    pub event_store: EventStoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            host: "0.0.0.0".to_owned(),
            port: 3000,
            max_connections: 10,
            log_format: LogFormat::default(),
            event_store: EventStoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the YAML file cannot be read or parsed,
    /// a variable has an invalid value, or `DATABASE_URL` is missing.
    pub fn from_env() -> Result<Self, AppError> {
        Self::load(|key| std::env::var(key).ok())
    }

    /// Loads the configuration, reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn load(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = match lookup("WARDEN_CONFIG") {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| AppError::Config(format!("cannot read {path}: {e}")))?;
                Self::from_yaml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a YAML document; absent keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the document is malformed.
    pub fn from_yaml(text: &str) -> Result<Self, AppError> {
        serde_yaml::from_str(text).map_err(|e| AppError::Config(format!("invalid config file: {e}")))
    }

    fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) -> Result<(), AppError> {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = parse(lookup, "PORT")? {
            self.port = port;
        }
        if let Some(max) = parse(lookup, "DATABASE_MAX_CONNECTIONS")? {
            self.max_connections = max;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.log_format = match format.as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(AppError::Config(format!(
                        "LOG_FORMAT must be json or pretty, got {other:?}"
                    )));
                }
            };
        }
        if let Some(attempts) = parse(lookup, "PUSH_MAX_ATTEMPTS")? {
            self.event_store.max_push_attempts = attempts;
        }
        if let Some(backoff) = parse(lookup, "PUSH_RETRY_BACKOFF_MS")? {
            self.event_store.retry_backoff_ms = backoff;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.database_url.is_empty() {
            return Err(AppError::Config("DATABASE_URL must be set".to_owned()));
        }
        if self.max_connections == 0 {
            return Err(AppError::Config(
                "DATABASE_MAX_CONNECTIONS must be at least 1".to_owned(),
            ));
        }
        if self.event_store.max_push_attempts == 0 {
            return Err(AppError::Config(
                "PUSH_MAX_ATTEMPTS must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `host` is not an IP address.
    pub fn listen_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, AppError>
where
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|value| {
            value
                .parse()
                .map_err(|e| AppError::Config(format!("{key} is invalid: {e}")))
        })
        .transpose()
}
