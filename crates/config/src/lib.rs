//! Configuration loading, validation, and management for GuildPilot.
//!
//! Loads configuration from `~/.guildpilot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.guildpilot/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model selection
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Loop limits, deduplication sets and pacing
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Provider retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Checklist planning pre-pass
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Conversation assembly
    #[serde(default)]
    pub context: ContextConfig,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Model used for the main tool-calling rounds
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used for planner, fallback and limit-summary calls
    #[serde(default = "default_light_model")]
    pub light_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_light_model() -> String {
    "gemini-2.5-flash-lite".into()
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            light_model: default_light_model(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum provider rounds per request
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Dedup skips tolerated before the loop is forced to stop
    #[serde(default = "default_loop_guard_threshold")]
    pub loop_guard_threshold: u32,

    /// Pause after every executed operation, in milliseconds
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Characters allowed in one chat message
    #[serde(default = "default_display_limit")]
    pub display_limit: usize,

    /// Operations allowed at most one real execution per request
    #[serde(default = "default_single_execution")]
    pub single_execution: Vec<String>,

    /// Operation allowed only one attempt per request, whatever its arguments
    #[serde(default = "default_repeat_guard")]
    pub repeat_guard: Option<String>,

    /// Operations whose `channel` argument defaults to the origin channel
    /// even when absent
    #[serde(default = "default_channel_defaulted")]
    pub channel_defaulted: Vec<String>,

    /// Operation that may replace the origin channel
    #[serde(default = "default_channel_replace")]
    pub channel_replace: Option<String>,

    /// Ask the light model to word the round-limit message
    #[serde(default)]
    pub summarize_on_limit: bool,
}

fn default_max_rounds() -> u32 {
    5
}
fn default_loop_guard_threshold() -> u32 {
    2
}
fn default_pacing_ms() -> u64 {
    500
}
fn default_display_limit() -> usize {
    2000
}
fn default_single_execution() -> Vec<String> {
    vec!["search".into(), "createEmbed".into()]
}
fn default_repeat_guard() -> Option<String> {
    Some("screenshotWebsite".into())
}
fn default_channel_defaulted() -> Vec<String> {
    vec!["purgeMessages".into(), "getMessages".into()]
}
fn default_channel_replace() -> Option<String> {
    Some("purgeChannel".into())
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            loop_guard_threshold: default_loop_guard_threshold(),
            pacing_ms: default_pacing_ms(),
            display_limit: default_display_limit(),
            single_execution: default_single_execution(),
            repeat_guard: default_repeat_guard(),
            channel_defaulted: default_channel_defaulted(),
            channel_replace: default_channel_replace(),
            summarize_on_limit: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts for main tool-calling rounds
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Attempts for lightweight auxiliary calls
    #[serde(default = "default_aux_max_attempts")]
    pub aux_max_attempts: u32,

    /// First backoff delay; doubles on every further attempt
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_aux_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            aux_max_attempts: default_aux_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Operation prepended when the request reads like a lookup
    #[serde(default = "default_search_operation")]
    pub search_operation: String,

    /// Operations appended when the request asks for rich formatting
    #[serde(default = "default_formatting_operations")]
    pub formatting_operations: Vec<String>,

    #[serde(default = "default_search_keywords")]
    pub search_keywords: Vec<String>,

    #[serde(default = "default_formatting_keywords")]
    pub formatting_keywords: Vec<String>,
}

fn default_search_operation() -> String {
    "search".into()
}
fn default_formatting_operations() -> Vec<String> {
    vec!["createEmbed".into()]
}
fn default_search_keywords() -> Vec<String> {
    [
        "search",
        "look up",
        "lookup",
        "google",
        "find out",
        "latest",
        "news",
        "who is",
        "what is",
        "current",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_formatting_keywords() -> Vec<String> {
    ["embed", "formatted", "fancy", "rich", "pretty", "card"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_operation: default_search_operation(),
            formatting_operations: default_formatting_operations(),
            search_keywords: default_search_keywords(),
            formatting_keywords: default_formatting_keywords(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Prior channel messages included in the conversation
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Largest attachment sent inline, in bytes
    #[serde(default = "default_inline_limit")]
    pub inline_attachment_limit: u64,

    /// MIME types (or `type/*` prefixes) eligible for inlining
    #[serde(default = "default_inline_mime_types")]
    pub inline_mime_types: Vec<String>,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_history_limit() -> usize {
    10
}
fn default_inline_limit() -> u64 {
    8 * 1024 * 1024
}
fn default_inline_mime_types() -> Vec<String> {
    vec![
        "image/*".into(),
        "application/pdf".into(),
        "text/plain".into(),
    ]
}
fn default_system_prompt() -> String {
    "You are a helpful assistant inside a chat server. Use the available operations to \
     carry out what the user asks, one step at a time, then reply briefly with what was done."
        .into()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            inline_attachment_limit: default_inline_limit(),
            inline_mime_types: default_inline_mime_types(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.guildpilot/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `GUILDPILOT_MODEL`
    /// - `GUILDPILOT_LIGHT_MODEL`
    /// - `GUILDPILOT_MAX_ROUNDS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
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

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(model) = std::env::var("GUILDPILOT_MODEL") {
            self.provider.model = model;
        }
        if let Ok(model) = std::env::var("GUILDPILOT_LIGHT_MODEL") {
            self.provider.light_model = model;
        }
        if let Ok(rounds) = std::env::var("GUILDPILOT_MAX_ROUNDS") {
            self.orchestrator.max_rounds = rounds.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "GUILDPILOT_MAX_ROUNDS must be a positive integer, got '{rounds}'"
                ))
            })?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".guildpilot")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.orchestrator.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_rounds must be at least 1".into(),
            ));
        }
        if self.orchestrator.loop_guard_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.loop_guard_threshold must be at least 1".into(),
            ));
        }
        if self.orchestrator.display_limit < 100 {
            return Err(ConfigError::ValidationError(
                "orchestrator.display_limit must be at least 100 characters".into(),
            ));
        }
        if self.retry.max_attempts == 0 || self.retry.aux_max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
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
