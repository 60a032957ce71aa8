//! Configuration loading for Parley.
//!
//! The config file is TOML, read from `$PARLEY_CONFIG` or
//! `~/.parley/config.toml`:
//!
//! ```toml
//! [chat]
//! system_message = "You are Parley, a friendly regular in this channel."
//! model = "gpt-3.5-turbo"
//! max_tokens = 2048
//!
//! [librarian]
//! batch_size = 3
//!
//! [api]
//! key = "${OPENAI_API_KEY}"
//! ```
//!
//! Every option except `chat.system_message` has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;

use parley_types::{ApiKey, SamplingParams, TypingPolicy};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "PARLEY_CONFIG";
/// Environment variable consulted when `[api] key` is missing or expands to nothing.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_BOT_NAME: &str = "Parley";
pub const DEFAULT_CHANNEL: &str = "placeholder-gpt";
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_BATCH_SIZE: usize = 3;

const fn default_temperature() -> f64 {
    1.0
}

const fn default_librarian_temperature() -> f64 {
    0.2
}

const fn default_top_p() -> f64 {
    1.0
}

const fn default_interval_secs() -> f64 {
    1.0
}

const fn default_client_timeout() -> u64 {
    DEFAULT_CLIENT_TIMEOUT_SECS
}

const fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

const fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_bot_name() -> String {
    DEFAULT_BOT_NAME.to_string()
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config file location: set PARLEY_CONFIG or provide a home directory")]
    NoPath,
    #[error("failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config at {}: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::NoPath => None,
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => Some(path.as_path()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ParleyConfig {
    pub chat: ChatConfig,
    #[serde(default)]
    pub librarian: LibrarianConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Options for the chat pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub system_message: String,
    /// Display name used when recording the bot's own turns.
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    /// The only channel the bot listens and replies in.
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default)]
    pub presence_penalty: f64,
    #[serde(default)]
    pub frequency_penalty: f64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_client_timeout")]
    pub client_timeout: u64,
    /// Token budget for the conversation window.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Pause between handled messages, in seconds.
    #[serde(default = "default_interval_secs")]
    pub message_interval: f64,
    #[serde(default)]
    pub typing: TypingPolicy,
}

/// Options for background fact extraction.
#[derive(Debug, Clone, Deserialize)]
pub struct LibrarianConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_librarian_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_client_timeout")]
    pub client_timeout: u64,
    /// Snapshot notifications per extraction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause after each extraction, in seconds.
    #[serde(default = "default_interval_secs")]
    pub settle_delay: f64,
}

impl Default for LibrarianConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_librarian_temperature(),
            top_p: default_top_p(),
            client_timeout: default_client_timeout(),
            batch_size: default_batch_size(),
            settle_delay: default_interval_secs(),
        }
    }
}

#[derive(Deserialize)]
pub struct ApiConfig {
    /// Bearer token. Supports `${ENV_VAR}` references.
    pub key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: None,
            base_url: default_base_url(),
        }
    }
}

// Manual Debug impl to prevent leaking API keys in logs.
impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ChatConfig {
    #[must_use]
    pub fn sampling_params(&self) -> SamplingParams {
        SamplingParams::new(&self.model, self.temperature, self.top_p)
            .with_penalties(self.presence_penalty, self.frequency_penalty)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout)
    }

    /// Only meaningful after validation, which rejects negative or non-finite values.
    #[must_use]
    pub fn message_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.message_interval).unwrap_or_default()
    }
}

impl LibrarianConfig {
    #[must_use]
    pub fn sampling_params(&self) -> SamplingParams {
        SamplingParams::new(&self.model, self.temperature, self.top_p)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout)
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.settle_delay).unwrap_or_default()
    }
}

impl ApiConfig {
    /// The configured key with `${VAR}` references expanded, falling back to
    /// `$OPENAI_API_KEY` when the result is empty.
    #[must_use]
    pub fn resolve_key(&self) -> Option<ApiKey> {
        self.key
            .as_deref()
            .map(expand_env_vars)
            .filter(|key| !key.trim().is_empty())
            .or_else(|| env::var(API_KEY_ENV).ok().filter(|key| !key.trim().is_empty()))
            .map(|key| ApiKey::new(key.trim()))
    }

    #[must_use]
    pub fn resolve_base_url(&self) -> String {
        expand_env_vars(&self.base_url)
            .trim_end_matches('/')
            .to_string()
    }
}

/// Replace `${VAR}` with the variable's value. Unset variables become empty;
/// unterminated or empty references are kept literally.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                out.push_str(&env::var(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            Some(end) => {
                // `${}`: dropped
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

impl ParleyConfig {
    /// Load from [`config_path`]. A missing file is an error: the system
    /// message has no default.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path().ok_or(ConfigError::NoPath)?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        Self::parse(&content, path)
    }

    /// Parse and validate TOML text. `path` is used for error reporting only.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = match toml::from_str(content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                return Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        config.validate().map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        let chat = &self.chat;
        let librarian = &self.librarian;

        if chat.system_message.trim().is_empty() {
            return Err("chat.system_message must not be empty".into());
        }
        if chat.max_tokens == 0 {
            return Err("chat.max_tokens must be greater than zero".into());
        }
        if chat.client_timeout == 0 {
            return Err("chat.client_timeout must be greater than zero".into());
        }
        if librarian.client_timeout == 0 {
            return Err("librarian.client_timeout must be greater than zero".into());
        }
        if librarian.batch_size == 0 {
            return Err("librarian.batch_size must be greater than zero".into());
        }

        let finite = [
            ("chat.temperature", chat.temperature),
            ("chat.top_p", chat.top_p),
            ("chat.presence_penalty", chat.presence_penalty),
            ("chat.frequency_penalty", chat.frequency_penalty),
            ("librarian.temperature", librarian.temperature),
            ("librarian.top_p", librarian.top_p),
        ];
        if let Some((name, _)) = finite.iter().find(|(_, value)| !value.is_finite()) {
            return Err(format!("{name} must be a finite number"));
        }

        let delays = [
            ("chat.message_interval", chat.message_interval),
            ("librarian.settle_delay", librarian.settle_delay),
        ];
        if let Some((name, _)) = delays
            .iter()
            .find(|(_, secs)| Duration::try_from_secs_f64(*secs).is_err())
        {
            return Err(format!("{name} must be a non-negative number of seconds"));
        }

        Ok(())
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

/// `$PARLEY_CONFIG` if set, else `~/.parley/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(explicit));
    }
    dirs::home_dir().map(|home| home.join(".parley").join("config.toml"))
}
