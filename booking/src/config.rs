//! Configuration management for the booking flow.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default cap on tickets per booking
pub const DEFAULT_TICKET_LIMIT: usize = 10;

/// Default payment window in seconds
pub const DEFAULT_PAYMENT_WINDOW_SECS: u64 = 600;

/// Default wait before judging a freshly mounted payment page empty
pub const DEFAULT_HYDRATION_GRACE_MS: u64 = 300;

/// Booking flow configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend base URL; `None` runs against the scripted offline backend
    pub api_url: Option<String>,
    /// Bearer token of the signed-in user
    pub api_token: Option<String>,
    /// Maximum seats per booking
    pub ticket_limit: usize,
    /// Length of the payment window
    pub payment_window: Duration,
    /// Grace delay before an empty payment session is rejected
    pub hydration_grace: Duration,
    /// File backing the durable session store
    pub storage_path: PathBuf,
    /// Per-request HTTP timeout
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            api_token: None,
            ticket_limit: DEFAULT_TICKET_LIMIT,
            payment_window: Duration::from_secs(DEFAULT_PAYMENT_WINDOW_SECS),
            hydration_grace: Duration::from_millis(DEFAULT_HYDRATION_GRACE_MS),
            storage_path: PathBuf::from("cinebook-session.json"),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `CINEBOOK_API_URL` | unset (offline backend) |
    /// | `CINEBOOK_API_TOKEN` | unset (anonymous) |
    /// | `CINEBOOK_TICKET_LIMIT` | `10` |
    /// | `CINEBOOK_PAYMENT_WINDOW_SECS` | `600` |
    /// | `CINEBOOK_HYDRATION_GRACE_MS` | `300` |
    /// | `CINEBOOK_STORAGE_PATH` | `cinebook-session.json` |
    /// | `CINEBOOK_HTTP_TIMEOUT_SECS` | `30` |
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unparseable or
    /// out-of-range value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unparseable or
    /// out-of-range value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let ticket_limit = parse(&lookup, "CINEBOOK_TICKET_LIMIT")?.unwrap_or(defaults.ticket_limit);
        if ticket_limit == 0 {
            return Err(ConfigError::OutOfRange {
                name: "CINEBOOK_TICKET_LIMIT",
                requirement: "at least 1",
            });
        }

        let payment_window = parse(&lookup, "CINEBOOK_PAYMENT_WINDOW_SECS")?
            .map_or(defaults.payment_window, Duration::from_secs);
        if payment_window.is_zero() {
            return Err(ConfigError::OutOfRange {
                name: "CINEBOOK_PAYMENT_WINDOW_SECS",
                requirement: "at least 1 second",
            });
        }

        Ok(Self {
            api_url: text("CINEBOOK_API_URL"),
            api_token: text("CINEBOOK_API_TOKEN"),
            ticket_limit,
            payment_window,
            hydration_grace: parse(&lookup, "CINEBOOK_HYDRATION_GRACE_MS")?
                .map_or(defaults.hydration_grace, Duration::from_millis),
            storage_path: text("CINEBOOK_STORAGE_PATH").map_or(defaults.storage_path, PathBuf::from),
            http_timeout: parse(&lookup, "CINEBOOK_HTTP_TIMEOUT_SECS")?
                .map_or(defaults.http_timeout, Duration::from_secs),
        })
    }
}

fn parse<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
    }
}
