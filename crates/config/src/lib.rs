//! Configuration loading, validation, and management for MedQuery.
//!
//! Loads configuration from `~/.medquery/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.medquery/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default query locale
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Language model settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Agent loop bounds
    #[serde(default)]
    pub agent: AgentConfig,

    /// Fast-path classifier settings
    #[serde(default)]
    pub fast_path: FastPathConfig,

    /// Medication catalog
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// External label source (openFDA)
    #[serde(default)]
    pub external: ExternalConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Recent trace history
    #[serde(default)]
    pub traces: TracesConfig,
}

fn default_locale() -> String {
    "fr".into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// "ollama" or "openai" (any OpenAI-compatible endpoint)
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_base_url() -> String {
    "http://localhost:11434/v1".into()
}
fn default_model() -> String {
    "qwen2.5:1.5b".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    1024
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum number of tool round-trips per query
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Run the tool calls of one model turn concurrently
    #[serde(default = "default_true")]
    pub parallel_tools: bool,
}

fn default_max_iterations() -> usize {
    5
}
fn default_model_timeout_secs() -> u64 {
    60
}
fn default_tool_timeout_secs() -> u64 {
    15
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            model_timeout_secs: default_model_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            parallel_tools: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastPathConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum similarity score (0-100) for a fuzzy match to be accepted
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: u8,

    /// Candidates within this many points of the best are ambiguous
    #[serde(default = "default_ambiguity_margin")]
    pub ambiguity_margin: u8,
}

fn default_accept_threshold() -> u8 {
    60
}
fn default_ambiguity_margin() -> u8 {
    5
}

impl Default for FastPathConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            accept_threshold: default_accept_threshold(),
            ambiguity_margin: default_ambiguity_margin(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// JSON catalog file. The bundled seed catalog is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_external_base_url")]
    pub base_url: String,

    #[serde(default = "default_external_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_external_base_url() -> String {
    "https://api.fda.gov/drug/label.json".into()
}
fn default_external_timeout_secs() -> u64 {
    10
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_external_base_url(),
            timeout_secs: default_external_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracesConfig {
    /// How many recent traces to keep in memory
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_history_limit() -> usize {
    50
}

impl Default for TracesConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.medquery/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `MEDQUERY_API_KEY`
    /// - `MEDQUERY_MODEL`
    /// - `MEDQUERY_BASE_URL`
    /// - `MEDQUERY_KNOWLEDGE_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
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

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("MEDQUERY_API_KEY").filter(|k| !k.is_empty()) {
            self.model.api_key = Some(key);
        }
        if let Some(model) = lookup("MEDQUERY_MODEL").filter(|m| !m.is_empty()) {
            self.model.model = model;
        }
        if let Some(url) = lookup("MEDQUERY_BASE_URL").filter(|u| !u.is_empty()) {
            self.model.base_url = url;
        }
        if let Some(path) = lookup("MEDQUERY_KNOWLEDGE_PATH").filter(|p| !p.is_empty()) {
            self.knowledge.database_path = Some(PathBuf::from(path));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".medquery")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !matches!(self.model.provider.as_str(), "ollama" | "openai") {
            return Err(ConfigError::ValidationError(format!(
                "model.provider must be 'ollama' or 'openai', got '{}'",
                self.model.provider
            )));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.model_timeout_secs == 0 || self.agent.tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent timeouts must be greater than zero".into(),
            ));
        }

        if self.fast_path.accept_threshold > 100 {
            return Err(ConfigError::ValidationError(
                "fast_path.accept_threshold must be between 0 and 100".into(),
            ));
        }

        if self.locale.trim().is_empty() {
            return Err(ConfigError::ValidationError("locale must not be empty".into()));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.model.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            model: ModelConfig::default(),
            agent: AgentConfig::default(),
            fast_path: FastPathConfig::default(),
            knowledge: KnowledgeConfig::default(),
            external: ExternalConfig::default(),
            gateway: GatewayConfig::default(),
            traces: TracesConfig::default(),
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
