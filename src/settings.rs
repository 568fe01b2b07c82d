//! Configuration settings loaded from environment variables
//!
//! Every setting has a default, so an empty environment yields a working
//! in-process setup. Values that are present but malformed are reported as
//! [`DispatchError::ConfigurationError`] instead of being replaced silently.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::dispatch::DispatchOptions;
use crate::error::{DispatchError, Result};
use crate::storage::StorageConfig;

pub const BROKER_URL: &str = "QDISPATCH_BROKER_URL";
pub const RESULT_BACKEND_URL: &str = "QDISPATCH_RESULT_BACKEND_URL";
pub const TASK_IGNORE_RESULT: &str = "QDISPATCH_TASK_IGNORE_RESULT";
pub const HOST: &str = "QDISPATCH_HOST";
pub const PORT: &str = "QDISPATCH_PORT";
pub const WORKERS: &str = "QDISPATCH_WORKERS";
pub const RESULT_TTL_SECS: &str = "QDISPATCH_RESULT_TTL_SECS";
pub const LOG: &str = "QDISPATCH_LOG";

/// Application settings loaded from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Where job messages are pushed (`memory://` or `redis://...`)
    pub broker_url: String,
    /// Where job records live; defaults to the broker url
    pub result_backend_url: String,
    /// Drop computed values unless a submission asks to keep them
    pub task_ignore_result: bool,
    /// HTTP bind host
    pub host: String,
    /// HTTP bind port
    pub port: u16,
    /// Number of worker loops
    pub workers: usize,
    /// How long job records are retained, zero keeps them forever
    pub result_ttl: Duration,
    /// Log filter directive
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker_url: "memory://".to_string(),
            result_backend_url: "memory://".to_string(),
            task_ignore_result: true,
            host: "127.0.0.1".to_string(),
            port: 5000,
            workers: 4,
            result_ttl: Duration::from_secs(86_400),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load `.env` if present, then read the process environment
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::load_dotenv()? {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }

        Self::from_env()
    }

    /// Merge a `.env` file into the process environment, returning its path
    ///
    /// A missing file is not an error.
    pub fn load_dotenv() -> Result<Option<PathBuf>> {
        match dotenvy::dotenv() {
            Ok(path) => Ok(Some(path)),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(DispatchError::configuration(format!(
                "Failed to read .env file: {}",
                e
            ))),
        }
    }

    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup
    ///
    /// ```rust
    /// use qdispatch::Settings;
    ///
    /// let settings = Settings::from_lookup(|key| match key {
    ///     "QDISPATCH_PORT" => Some("8080".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    ///
    /// assert_eq!(settings.port, 8080);
    /// assert_eq!(settings.broker_url, "memory://");
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();

        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let parse_num = |key: &str| -> Result<Option<u64>> {
            get(key)
                .map(|value| {
                    value.trim().parse::<u64>().map_err(|_| {
                        DispatchError::configuration(format!(
                            "Invalid number for {}: {}",
                            key, value
                        ))
                    })
                })
                .transpose()
        };

        let parse_bool = |key: &str| -> Result<Option<bool>> {
            get(key).map(|value| parse_bool_value(key, &value)).transpose()
        };

        let broker_url = get(BROKER_URL).unwrap_or(defaults.broker_url);
        let result_backend_url = get(RESULT_BACKEND_URL).unwrap_or_else(|| broker_url.clone());

        let port = match parse_num(PORT)? {
            Some(port) => u16::try_from(port).map_err(|_| {
                DispatchError::configuration(format!("Invalid port for {}: {}", PORT, port))
            })?,
            None => defaults.port,
        };

        let workers = match parse_num(WORKERS)? {
            Some(0) => {
                return Err(DispatchError::configuration(format!(
                    "{} must be at least 1",
                    WORKERS
                )));
            }
            Some(workers) => workers as usize,
            None => defaults.workers,
        };

        let settings = Settings {
            broker_url,
            result_backend_url,
            task_ignore_result: parse_bool(TASK_IGNORE_RESULT)?
                .unwrap_or(defaults.task_ignore_result),
            host: get(HOST).unwrap_or(defaults.host),
            port,
            workers,
            result_ttl: parse_num(RESULT_TTL_SECS)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.result_ttl),
            log_level: get(LOG).unwrap_or(defaults.log_level),
        };

        // Reject unknown schemes now rather than at first use.
        settings.broker_config()?;
        settings.result_backend_config()?;

        Ok(settings)
    }

    /// Storage configuration of the broker
    pub fn broker_config(&self) -> Result<StorageConfig> {
        self.storage_config(&self.broker_url)
    }

    /// Storage configuration of the result backend
    pub fn result_backend_config(&self) -> Result<StorageConfig> {
        self.storage_config(&self.result_backend_url)
    }

    /// Whether queue and results can live in one in-process backend
    pub fn shares_memory_backend(&self) -> bool {
        self.broker_url == self.result_backend_url
            && StorageConfig::from_url(&self.broker_url)
                .map(|config| config.is_memory())
                .unwrap_or(false)
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions::default().ignore_result(self.task_ignore_result)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn storage_config(&self, url: &str) -> Result<StorageConfig> {
        let config = StorageConfig::from_url(url)?;
        Ok(if self.result_ttl.is_zero() {
            config.without_result_ttl()
        } else {
            config.with_result_ttl(self.result_ttl)
        })
    }
}

fn parse_bool_value(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(DispatchError::configuration(format!(
            "Invalid boolean value for {}: {}",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_missing_dotenv_is_not_an_error() {
        // Absent is fine; a file that exists must parse
        assert!(Settings::load_dotenv().is_ok());
    }

    #[test]
    fn test_defaults() {
        let settings = from_pairs(&[]).unwrap();

        assert_eq!(settings, Settings::default());
        assert!(settings.shares_memory_backend());
        assert!(settings.dispatch_options().ignore_result);
        assert_eq!(settings.http_addr(), "127.0.0.1:5000");
    }

    #[test]
    fn test_result_backend_defaults_to_broker() {
        let settings = from_pairs(&[(BROKER_URL, "redis://broker:6379/0")]).unwrap();

        assert_eq!(settings.result_backend_url, "redis://broker:6379/0");
        assert!(!settings.shares_memory_backend());
    }

    #[test]
    fn test_overrides() {
        let settings = from_pairs(&[
            (TASK_IGNORE_RESULT, "off"),
            (HOST, "0.0.0.0"),
            (PORT, "8080"),
            (WORKERS, "8"),
            (RESULT_TTL_SECS, "60"),
            (LOG, "debug"),
        ])
        .unwrap();

        assert!(!settings.task_ignore_result);
        assert_eq!(settings.http_addr(), "0.0.0.0:8080");
        assert_eq!(settings.workers, 8);
        assert_eq!(settings.result_ttl, Duration::from_secs(60));
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_bool_spellings() {
        for (raw, expected) in [
            ("true", true),
            ("YES", true),
            ("1", true),
            ("on", true),
            ("false", false),
            ("No", false),
            ("0", false),
            ("off", false),
        ] {
            assert_eq!(parse_bool_value(TASK_IGNORE_RESULT, raw).unwrap(), expected);
        }
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        for pairs in [
            vec![(TASK_IGNORE_RESULT, "maybe")],
            vec![(PORT, "not-a-port")],
            vec![(PORT, "70000")],
            vec![(WORKERS, "0")],
            vec![(RESULT_TTL_SECS, "-1")],
            vec![(BROKER_URL, "amqp://guest@localhost//")],
        ] {
            let result = from_pairs(&pairs);
            assert!(
                matches!(result, Err(DispatchError::ConfigurationError { .. })),
                "expected configuration error for {:?}",
                pairs
            );
        }
    }
}
