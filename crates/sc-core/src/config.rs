use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use sc_backend::ClientConfig;
use sc_protocol::StreamError;
use thiserror::Error;
use tracing::warn;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "STREAMCHAT_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("{env} not set and no api_key_cmd configured")]
    MissingApiKey { env: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] StreamError),
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub chat: ChatConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Chat-completions endpoint of an OpenAI-compatible server.
    pub endpoint: String,
    /// Model sent when a request names none. Omitted from the body if unset.
    pub model: Option<String>,
    /// Command printing the API key on stdout, run via `sh -c`.
    pub api_key_cmd: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Frames buffered between the connection and the display.
    pub channel_capacity: usize,
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: None,
            api_key_cmd: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            channel_capacity: 64,
            connect_timeout_secs: 10,
        }
    }
}

impl BackendConfig {
    /// Resolve the API key from api_key_cmd, then the configured env var.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(cmd) = &self.api_key_cmd {
            match Command::new("sh").arg("-c").arg(cmd).output() {
                Ok(output) if output.status.success() => {
                    let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !key.is_empty() {
                        return Ok(key);
                    }
                    warn!("api_key_cmd printed nothing");
                }
                Ok(output) => warn!(status = %output.status, "api_key_cmd failed"),
                Err(e) => warn!(error = %e, "api_key_cmd could not run"),
            }
        }

        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey {
                env: self.api_key_env.clone(),
            })
    }

    /// Client settings for `api_key`.
    pub fn client_config(&self, api_key: impl Into<String>) -> ClientConfig {
        let mut config = ClientConfig::new(self.endpoint.clone(), api_key);
        config.default_model = self.model.clone();
        config.channel_capacity = self.channel_capacity.max(1);
        config.connect_timeout = Duration::from_secs(self.connect_timeout_secs);
        config
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    /// Prepended to every request as a system message.
    pub system_prompt: Option<String>,
    /// History cap; the oldest messages go first.
    pub max_history_messages: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_history_messages: 40,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `STREAMCHAT_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the config file, falling back to defaults if it is missing or
    /// unreadable.
    pub fn load_or_default() -> Self {
        let path = config_path();
        if !path.exists() {
            return Config::default();
        }
        Self::load_from(&path).unwrap_or_else(|e| {
            warn!("{e}; using defaults");
            Config::default()
        })
    }
}

fn config_path() -> PathBuf {
    if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(explicit);
    }

    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("streamchat").join("config.toml")
}
