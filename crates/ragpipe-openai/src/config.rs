//! OpenAI client configuration

use serde::{Deserialize, Serialize};
use std::env;

use ragpipe_core::{Error, Result};

/// Default endpoint; an API key is mandatory here
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for the OpenAI-compatible client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
}

impl OpenAIConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self::from_env_unchecked();
        config.validate()?;
        Ok(config)
    }

    /// Read the environment (and `.env`) without validating, for display
    pub fn from_env_unchecked() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENAI_API_KEY")
            .or_else(|| lookup("API_KEY"))
            .unwrap_or_default();

        let base_url = lookup("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self { api_key, base_url }
    }

    /// Create configuration with explicit values
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at another OpenAI-compatible server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Hosted OpenAI needs a key; local compatible servers usually do not
    pub fn requires_api_key(&self) -> bool {
        url::Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h == "api.openai.com"))
            .unwrap_or(false)
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url).map_err(|e| {
            Error::Configuration(format!("invalid OPENAI_BASE_URL '{}': {}", self.base_url, e))
        })?;

        if self.requires_api_key() && self.api_key.trim().is_empty() {
            return Err(Error::Configuration(
                "OPENAI_API_KEY must be set when using api.openai.com".to_string(),
            ));
        }

        Ok(())
    }

    /// Base URL without a trailing slash
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}
