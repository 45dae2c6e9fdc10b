//! Configuration loading, validation, and management for SmartSeva.
//!
//! Loads configuration from `~/.smartseva/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.smartseva/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default completion provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Conversational memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Retrieval and context assembly configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Query pipeline limits
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Chat log storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Assistant identity
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini-2024-07-18".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("memory", &self.memory)
            .field("retrieval", &self.retrieval)
            .field("pipeline", &self.pipeline)
            .field("storage", &self.storage)
            .field("identity", &self.identity)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Exchanges (question/answer pairs) kept per session
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

fn default_window_size() -> usize {
    6
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// JSONL corpus file; defaults to `~/.smartseva/data/corpus.jsonl`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_path: Option<PathBuf>,

    /// Documents fetched from the store per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Documents scoring below this are dropped from the context
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,

    /// Upper bound on documents placed in the prompt
    #[serde(default = "default_max_context_documents")]
    pub max_context_documents: usize,
}

fn default_top_k() -> usize {
    4
}
fn default_relevance_threshold() -> f32 {
    0.3
}
fn default_max_context_documents() -> usize {
    5
}

impl RetrievalConfig {
    pub fn corpus_path(&self) -> PathBuf {
        self.corpus_path
            .clone()
            .unwrap_or_else(|| AppConfig::data_dir().join("corpus.jsonl"))
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            corpus_path: None,
            top_k: default_top_k(),
            relevance_threshold: default_relevance_threshold(),
            max_context_documents: default_max_context_documents(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Wall-clock ceiling for one streamed answer
    #[serde(default = "default_streaming_timeout")]
    pub streaming_timeout_seconds: u64,

    /// Ceiling for a single document store call
    #[serde(default = "default_retrieval_timeout")]
    pub retrieval_timeout_seconds: u64,

    /// Longest accepted question, in characters
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,
}

fn default_streaming_timeout() -> u64 {
    60
}
fn default_retrieval_timeout() -> u64 {
    30
}
fn default_max_query_length() -> usize {
    2000
}

impl PipelineConfig {
    pub fn streaming_timeout(&self) -> Duration {
        Duration::from_secs(self.streaming_timeout_seconds)
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_seconds)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            streaming_timeout_seconds: default_streaming_timeout(),
            retrieval_timeout_seconds: default_retrieval_timeout(),
            max_query_length: default_max_query_length(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Chat log file; defaults to `~/.smartseva/data/chat_history.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_history_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn chat_history_path(&self) -> PathBuf {
        self.chat_history_path
            .clone()
            .unwrap_or_else(|| AppConfig::data_dir().join("chat_history.json"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Replace the built-in system prompt entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.smartseva/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `SMARTSEVA_API_KEY` (highest priority)
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("SMARTSEVA_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("SMARTSEVA_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("SMARTSEVA_MODEL") {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".smartseva")
    }

    /// Directory for the corpus and chat log.
    pub fn data_dir() -> PathBuf {
        Self::config_dir().join("data")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.memory.window_size == 0 {
            return Err(ConfigError::ValidationError(
                "memory.window_size must be at least 1".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.retrieval.relevance_threshold) {
            return Err(ConfigError::ValidationError(
                "retrieval.relevance_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if self.retrieval.max_context_documents == 0 || self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k and retrieval.max_context_documents must be > 0".into(),
            ));
        }

        if self.pipeline.streaming_timeout_seconds == 0
            || self.pipeline.retrieval_timeout_seconds == 0
        {
            return Err(ConfigError::ValidationError(
                "pipeline timeouts must be > 0".into(),
            ));
        }

        if self.pipeline.max_query_length == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_query_length must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            memory: MemoryConfig::default(),
            retrieval: RetrievalConfig::default(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
            identity: IdentityConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
