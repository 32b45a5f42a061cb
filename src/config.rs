//! Runtime configuration.
//!
//! Every setting has a compiled-in default and can be overridden through an
//! environment variable.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CHAIN: &str = "summarize";
/// User id sent to the backend before anyone has logged in.
pub const PLACEHOLDER_USER_ID: i64 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid backend origin {value:?}: {reason}")]
    ApiBase { value: String, reason: String },

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: Url,
    pub listen_addr: SocketAddr,
    pub timeout: Duration,
    pub chain: String,
    pub default_user_id: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolves settings through `lookup`, so tests don't need to touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base = parse_api_base(
            &lookup("PAPERDESK_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        )?;

        let listen = lookup("PAPERDESK_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen.parse().map_err(|_| ConfigError::Invalid {
            var: "PAPERDESK_LISTEN",
            value: listen.clone(),
        })?;

        let timeout_secs = match lookup("PAPERDESK_TIMEOUT_SECS") {
            Some(v) => v.parse::<u64>().map_err(|_| ConfigError::Invalid {
                var: "PAPERDESK_TIMEOUT_SECS",
                value: v.clone(),
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let default_user_id = match lookup("PAPERDESK_DEFAULT_USER") {
            Some(v) => v.parse::<i64>().map_err(|_| ConfigError::Invalid {
                var: "PAPERDESK_DEFAULT_USER",
                value: v.clone(),
            })?,
            None => PLACEHOLDER_USER_ID,
        };

        let chain = lookup("PAPERDESK_CHAIN")
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CHAIN.to_string());

        Ok(Self {
            api_base,
            listen_addr,
            timeout: Duration::from_secs(timeout_secs),
            chain,
            default_user_id,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: Url::parse(DEFAULT_API_BASE).expect("default origin is a valid URL"),
            listen_addr: DEFAULT_LISTEN_ADDR
                .parse()
                .expect("default listen address is valid"),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            chain: DEFAULT_CHAIN.to_string(),
            default_user_id: PLACEHOLDER_USER_ID,
        }
    }
}

/// Accepts absolute http(s) origins only.
pub fn parse_api_base(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim()).map_err(|e| ConfigError::ApiBase {
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ConfigError::ApiBase {
                value: value.to_string(),
                reason: format!("unsupported scheme {}", other),
            })
        }
    }
    if url.host_str().is_none() {
        return Err(ConfigError::ApiBase {
            value: value.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}
