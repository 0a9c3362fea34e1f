//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API base URL, request timeout, token trust window and
//! last used email.
//!
//! Configuration is stored at `~/.config/tiko-todos/config.json`. The
//! `TIKO_API_URL` and `TIKO_TIMEOUT_SECS` environment variables take
//! precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::normalize_base_url;
use crate::api::{ApiClient, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::auth::DEFAULT_TRUST_SECS;

/// Application name used for config directory paths
pub const APP_NAME: &str = "tiko-todos";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Overrides the API base URL
pub const ENV_API_URL: &str = "TIKO_API_URL";

/// Overrides the request timeout, in seconds
pub const ENV_TIMEOUT_SECS: &str = "TIKO_TIMEOUT_SECS";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub token_trust_secs: Option<u64>,
    pub last_email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Base URL, always ending in `/`
    pub fn api_base_url(&self) -> String {
        self.base_url_with(std::env::var(ENV_API_URL).ok())
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeout_with(std::env::var(ENV_TIMEOUT_SECS).ok())
    }

    pub fn trust_window(&self) -> Duration {
        Duration::from_secs(self.token_trust_secs.unwrap_or(DEFAULT_TRUST_SECS))
    }

    /// HTTP client configured from this config
    pub fn api_client(&self) -> Result<ApiClient> {
        ApiClient::with_base_url(&self.api_base_url(), self.request_timeout())
            .context("Failed to build HTTP client")
    }

    fn base_url_with(&self, env_value: Option<String>) -> String {
        let url = env_value
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        normalize_base_url(&url)
    }

    fn timeout_with(&self, env_value: Option<String>) -> Duration {
        let secs = env_value
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|&secs| secs > 0)
            .or(self.request_timeout_secs.filter(|&secs| secs > 0))
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }
}
