//! Reasoning provider configuration.
//!
//! Values resolve from the environment first and are then overridden by
//! command-line flags. The credential is only checked when a networked
//! provider is built, so replaying a recorded response works without one.

use std::{env, time::Duration};

use thiserror::Error;

use crate::cli::ProviderArgs;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const MODEL_ENV: &str = "OPENAI_MODEL";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-5.2";
pub const DEFAULT_REASONING_EFFORT: &str = "high";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{env_var} is not configured.")]
    MissingCredential { env_var: &'static str },
}

#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub reasoning_effort: Option<String>,
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            reasoning_effort: Some(DEFAULT_REASONING_EFFORT.to_string()),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

// Keeps the credential out of debug logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("reasoning_effort", &self.reasoning_effort)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup. Blank values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();
        Self {
            api_key: read(API_KEY_ENV),
            base_url: read(BASE_URL_ENV).unwrap_or(defaults.base_url),
            model: read(MODEL_ENV).unwrap_or(defaults.model),
            ..defaults
        }
    }

    pub fn with_overrides(mut self, args: &ProviderArgs) -> Self {
        if let Some(model) = args.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            self.model = model.to_string();
        }
        if let Some(endpoint) = args
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
        {
            self.base_url = endpoint.to_string();
        }
        if let Some(effort) = args.reasoning_effort.as_deref().map(str::trim) {
            self.reasoning_effort = match effort {
                "" | "none" => None,
                value => Some(value.to_string()),
            };
        }
        if let Some(secs) = args.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        self
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential {
                env_var: API_KEY_ENV,
            })
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}
