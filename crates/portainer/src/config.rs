//! Connection settings for a Portainer instance.
//!
//! Settings come from the `[provider]` table of a declaration file; the
//! endpoint and API key fall back to `PORTAINER_ENDPOINT` and
//! `PORTAINER_API_KEY`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Environment variable holding the Portainer URL.
pub const ENDPOINT_ENV: &str = "PORTAINER_ENDPOINT";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "PORTAINER_API_KEY";

/// Request timeout when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors raised while resolving connection settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no Portainer endpoint configured (set provider.endpoint or PORTAINER_ENDPOINT)")]
    MissingEndpoint,

    #[error("no API key configured (set provider.api_key or PORTAINER_API_KEY)")]
    MissingApiKey,

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The endpoint as configured.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// The `[provider]` table as written by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    /// Base URL, e.g. `https://portainer.example.com`
    #[serde(default)]
    pub endpoint: Option<String>,
    /// API key (JWT tokens are not supported)
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Resolved connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Normalized base URL, always ending in `/api`
    pub endpoint: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(endpoint: &str, api_key: impl Into<String>) -> Result<Self, ConfigError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(Self {
            endpoint: normalize_endpoint(endpoint)?,
            api_key,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Resolve settings, falling back to the process environment.
    pub fn resolve(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        Self::resolve_with(settings, |name| std::env::var(name).ok())
    }

    /// Resolve settings with a custom environment lookup.
    pub fn resolve_with<F>(settings: &ProviderSettings, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = non_blank(settings.endpoint.clone())
            .or_else(|| non_blank(env(ENDPOINT_ENV)))
            .ok_or(ConfigError::MissingEndpoint)?;
        let api_key = non_blank(settings.api_key.clone())
            .or_else(|| non_blank(env(API_KEY_ENV)))
            .ok_or(ConfigError::MissingApiKey)?;

        let config = Self::new(&endpoint, api_key)?;
        Ok(match settings.timeout_secs {
            Some(secs) if secs > 0 => config.with_timeout(secs),
            _ => config,
        })
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Trim trailing slashes and make sure the URL ends in `/api`
pub fn normalize_endpoint(endpoint: &str) -> Result<String, ConfigError> {
    let trimmed = endpoint.trim();
    let invalid = |reason: &str| ConfigError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| invalid("scheme must be http or https"))?;
    if rest.trim_end_matches('/').is_empty() {
        return Err(invalid("missing host"));
    }

    let base = trimmed.trim_end_matches('/');
    if base.ends_with("/api") {
        Ok(base.to_string())
    } else {
        Ok(format!("{base}/api"))
    }
}
