//! Engine configuration from the environment.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::context::RequestContext;

pub const DATABASE_URL: &str = "PANTRY_DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "PANTRY_DB_MAX_CONNECTIONS";
pub const REQUEST_TIMEOUT_MS: &str = "PANTRY_REQUEST_TIMEOUT_MS";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl EngineConfig {
    /// Read the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = vars
            .get(DATABASE_URL)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let max_connections = match vars.get(DB_MAX_CONNECTIONS) {
            Some(raw) => parse::<u32>(DB_MAX_CONNECTIONS, raw).and_then(|n| {
                if n == 0 {
                    Err(ConfigError::Invalid {
                        key: DB_MAX_CONNECTIONS,
                        value: raw.clone(),
                    })
                } else {
                    Ok(n)
                }
            })?,
            None => defaults.max_connections,
        };

        let request_timeout = match vars.get(REQUEST_TIMEOUT_MS) {
            Some(raw) => Duration::from_millis(parse::<u64>(REQUEST_TIMEOUT_MS, raw)?),
            None => defaults.request_timeout,
        };

        Ok(Self {
            database_url,
            max_connections,
            request_timeout,
        })
    }

    /// A fresh context carrying the configured per-request timeout.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_timeout(self.request_timeout)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = EngineConfig::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn reads_all_keys() {
        let config = EngineConfig::from_vars(&vars(&[
            (DATABASE_URL, "postgres://localhost/pantry"),
            (DB_MAX_CONNECTIONS, "4"),
            (REQUEST_TIMEOUT_MS, "250"),
        ]))
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/pantry"));
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.request_timeout, Duration::from_millis(250));
    }

    #[test]
    fn blank_database_url_means_in_memory() {
        let config = EngineConfig::from_vars(&vars(&[(DATABASE_URL, "  ")])).unwrap();
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn bad_numbers_are_reported_with_their_key() {
        let err = EngineConfig::from_vars(&vars(&[(REQUEST_TIMEOUT_MS, "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: REQUEST_TIMEOUT_MS,
                value: "soon".into()
            }
        );
        assert!(EngineConfig::from_vars(&vars(&[(DB_MAX_CONNECTIONS, "0")])).is_err());
    }
}
