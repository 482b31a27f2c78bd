//! Client configuration loaded from TOML.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Which remote store backs the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Documents held in process memory. Data is lost on exit.
    #[default]
    Memory,
    /// Firestore REST API.
    Firestore,
}

/// Remote store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Root of the Firestore REST API.
    pub base_url: String,
    pub project_id: Option<String>,
    pub database: String,
    /// Top-level collection holding conversation documents.
    pub collection: String,
    /// Web API key sent as the `key` query parameter.
    pub api_key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            base_url: "https://firestore.googleapis.com/v1".to_string(),
            project_id: None,
            database: "(default)".to_string(),
            collection: "allChats".to_string(),
            api_key: None,
        }
    }
}

/// Completion endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Text generator queried for replies.
    pub reply_url: String,
    /// Endpoint queried by credential checks.
    pub models_url: String,
    /// Upper bound of the random sentence count requested per reply.
    pub max_sentences: u32,
    /// Replies never complete sooner than this.
    pub min_reply_delay_ms: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            reply_url: "https://fish-text.ru/get".to_string(),
            models_url: "https://api.openai.com/v1/models".to_string(),
            max_sentences: 5,
            min_reply_delay_ms: 2000,
        }
    }
}

impl CompletionConfig {
    #[must_use]
    pub const fn min_reply_delay(&self) -> Duration {
        Duration::from_millis(self.min_reply_delay_ms)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub store: StoreConfig,
    pub completion: CompletionConfig,
}

impl ChatConfig {
    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns error if the TOML is malformed or has mistyped keys.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load from `path`, or from the default location when `path` is `None`.
    ///
    /// A missing default file yields the default configuration; an explicit
    /// path must exist.
    ///
    /// # Errors
    /// Returns error if a file exists but cannot be read or parsed.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// `<config dir>/chat-session/config.toml`
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chat-session").join("config.toml"))
    }
}
