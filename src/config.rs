//! Layered configuration: built-in defaults, then `~/.gitroast/config.toml`,
//! then environment variables for secrets.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoastError};

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1).
    pub bind: String,
    /// Listen port.
    pub port: u16,
    /// Deliver cache misses as an SSE stream instead of buffered JSON.
    pub stream_responses: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            stream_responses: true,
        }
    }
}

/// Server-side roast cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether cached roasts are served at all.
    pub enabled: bool,
    /// Override for the cache file path (default: `<data_dir>/shame_cache.json`).
    pub path: Option<PathBuf>,
    /// How long a row may satisfy a lookup after creation.
    pub freshness_secs: u64,
    /// How long an untouched row survives before the sweep deletes it.
    pub retention_secs: u64,
    /// Interval between background sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            freshness_secs: 24 * 60 * 60,
            retention_secs: 7 * 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
        }
    }
}

/// LLM backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API key. Usually left unset here and taken from `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Model identifier sent to the backend and recorded in cache rows.
    pub model: String,
    /// Chat-completions base URL.
    pub base_url: String,
    /// Completion token cap per roast.
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_tokens: 500,
        }
    }
}

/// GitHub API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub base_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
        }
    }
}

/// Per-IP request throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Admissions allowed per identifier per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window_secs: 60,
        }
    }
}

/// Admin endpoint settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Shared secret gating /admin endpoints. Unset disables them (401/404).
    pub secret: Option<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub llm: LlmConfig,
    pub github: GitHubConfig,
    pub rate_limit: RateLimitConfig,
    pub admin: AdminConfig,
}

impl Config {
    /// Load configuration: defaults, then the config file if present, then
    /// env-var overrides for secrets.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                let data = std::fs::read_to_string(&path)?;
                toml::from_str(&data)
                    .map_err(|e| RoastError::Config(format!("{}: {}", path.display(), e)))?
            }
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// `~/.gitroast/config.toml`.
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".gitroast").join("config.toml"))
    }

    /// Data directory for persisted caches: `~/.gitroast`.
    pub fn data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gitroast")
    }

    /// Resolved server cache file path.
    pub fn cache_path(&self) -> PathBuf {
        self.cache
            .path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("shame_cache.json"))
    }

    /// Secrets come from the environment when set there.
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(secret) = std::env::var("GITROAST_ADMIN_SECRET") {
            if !secret.is_empty() {
                self.admin.secret = Some(secret);
            }
        }
    }

    /// API key, or a config error telling the operator where to put it.
    pub fn require_api_key(&self) -> Result<&str> {
        self.llm
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                RoastError::Config(
                    "no LLM API key; set OPENAI_API_KEY or [llm].api_key".to_string(),
                )
            })
    }
}
