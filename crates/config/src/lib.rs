//! Configuration loading, validation, and management for Rulebook.
//!
//! Engine tunables load from `~/.rulebook/config.toml` (or `$RULEBOOK_CONFIG`)
//! with environment variable overrides, and may be partially overridden at
//! runtime by host-supplied JSON. Every path ends in [`EngineConfig::validate`].
//!
//! The router and provider documents shipped inside a pack are defined in
//! [`router`] and [`provider`].

pub mod provider;
pub mod router;

pub use provider::ProviderSpec;
pub use router::{ResolverThresholds, RouterConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine tunables. Loaded once, immutable for the life of an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Context bundle budget in estimated tokens
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Characters per estimated token
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// Model context window in tokens
    #[serde(default = "default_context_window_tokens")]
    pub context_window_tokens: usize,

    /// Tokens reserved for generation
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,

    /// Optional hard ceiling on prompt characters
    #[serde(default)]
    pub prompt_char_cap: Option<usize>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// System instruction placed in the chat template
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,

    #[serde(default)]
    pub chat_template: ChatTemplate,

    #[serde(default)]
    pub retrieval_mode: RetrievalMode,

    /// Rules scoring below this are discarded
    #[serde(default = "default_min_rule_score")]
    pub min_rule_score: u32,

    #[serde(default = "default_rules_per_section")]
    pub rules_per_section: usize,

    #[serde(default = "default_max_sections")]
    pub max_sections: usize,

    #[serde(default = "default_max_definitions")]
    pub max_definitions: usize,

    #[serde(default = "default_max_supporting_rules")]
    pub max_supporting_rules: usize,

    /// Legacy vector path: rule neighbours per question
    #[serde(default = "default_vector_top_k")]
    pub vector_top_k: usize,

    /// Legacy vector path: card neighbours per question
    #[serde(default = "default_vector_entity_k")]
    pub vector_entity_k: usize,
}

fn default_token_budget() -> usize {
    700
}
fn default_chars_per_token() -> usize {
    4
}
fn default_context_window_tokens() -> usize {
    2048
}
fn default_max_new_tokens() -> usize {
    256
}
fn default_temperature() -> f32 {
    0.2
}
fn default_top_p() -> f32 {
    0.9
}
fn default_system_instruction() -> String {
    "You are a rules judge for a tabletop card game. Answer only from the excerpts \
     provided. Cite rule numbers in brackets. If the excerpts do not cover the \
     question, say so."
        .into()
}
fn default_min_rule_score() -> u32 {
    2
}
fn default_rules_per_section() -> usize {
    3
}
fn default_max_sections() -> usize {
    3
}
fn default_max_definitions() -> usize {
    2
}
fn default_max_supporting_rules() -> usize {
    6
}
fn default_vector_top_k() -> usize {
    5
}
fn default_vector_entity_k() -> usize {
    1
}

/// Chat template format used to wrap the prompt for the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatTemplate {
    /// `<|im_start|>system\n{content}<|im_end|>\n<|im_start|>user\n...`
    #[default]
    ChatMl,
    /// `<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\n{content}<|eot_id|>`
    Llama3,
    /// `<start_of_turn>user\n{content}<end_of_turn>\n<start_of_turn>model\n`
    Gemma,
    /// `<|system|>\n{content}<|end|>\n<|user|>\n{content}<|end|>\n<|assistant|>\n`
    Phi3,
}

/// Which retrieval path answers questions. Never mixed within one answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    #[default]
    Deterministic,
    /// Legacy brute-force embedding search.
    Vector,
}

impl std::str::FromStr for RetrievalMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deterministic" => Ok(Self::Deterministic),
            "vector" => Ok(Self::Vector),
            other => Err(ConfigError::ValidationError(format!(
                "unknown retrieval_mode '{other}'"
            ))),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            chars_per_token: default_chars_per_token(),
            context_window_tokens: default_context_window_tokens(),
            max_new_tokens: default_max_new_tokens(),
            prompt_char_cap: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            system_instruction: default_system_instruction(),
            chat_template: ChatTemplate::default(),
            retrieval_mode: RetrievalMode::default(),
            min_rule_score: default_min_rule_score(),
            rules_per_section: default_rules_per_section(),
            max_sections: default_max_sections(),
            max_definitions: default_max_definitions(),
            max_supporting_rules: default_max_supporting_rules(),
            vector_top_k: default_vector_top_k(),
            vector_entity_k: default_vector_entity_k(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `$RULEBOOK_CONFIG` or `~/.rulebook/config.toml`.
    ///
    /// Environment overrides (highest priority):
    /// - `RULEBOOK_TOKEN_BUDGET`
    /// - `RULEBOOK_RETRIEVAL_MODE`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("RULEBOOK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&path)?;

        if let Ok(budget) = std::env::var("RULEBOOK_TOKEN_BUDGET") {
            config.token_budget = budget.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "RULEBOOK_TOKEN_BUDGET must be an integer, got '{budget}'"
                ))
            })?;
        }

        if let Ok(mode) = std::env::var("RULEBOOK_RETRIEVAL_MODE") {
            config.retrieval_mode = mode.parse()?;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".rulebook")
    }

    /// Apply a host-supplied partial override.
    ///
    /// `overrides` must be a JSON object whose keys are `EngineConfig` field
    /// names. Unknown keys, wrongly typed values, and values that fail
    /// [`validate`](Self::validate) are rejected and leave `self` untouched.
    pub fn apply_overrides(&mut self, overrides: &serde_json::Value) -> Result<(), ConfigError> {
        let fields = overrides.as_object().ok_or_else(|| ConfigError::Override {
            field: "<root>".into(),
            reason: "overrides must be a JSON object".into(),
        })?;

        let mut merged = serde_json::to_value(&*self).map_err(|e| ConfigError::Override {
            field: "<root>".into(),
            reason: e.to_string(),
        })?;

        for (field, value) in fields {
            let slot = merged
                .get_mut(field)
                .ok_or_else(|| ConfigError::Override {
                    field: field.clone(),
                    reason: "unknown field".into(),
                })?;
            *slot = value.clone();

            // Type-check field by field so the error names the culprit.
            serde_json::from_value::<Self>(merged.clone()).map_err(|e| ConfigError::Override {
                field: field.clone(),
                reason: e.to_string(),
            })?;
        }

        let candidate: Self =
            serde_json::from_value(merged).map_err(|e| ConfigError::Override {
                field: "<root>".into(),
                reason: e.to_string(),
            })?;
        candidate.validate()?;

        tracing::debug!(fields = fields.len(), "Applied engine config overrides");
        *self = candidate;
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_budget == 0 {
            return Err(ConfigError::ValidationError(
                "token_budget must be > 0".into(),
            ));
        }

        if self.chars_per_token == 0 {
            return Err(ConfigError::ValidationError(
                "chars_per_token must be > 0".into(),
            ));
        }

        if self.max_new_tokens >= self.context_window_tokens {
            return Err(ConfigError::ValidationError(
                "max_new_tokens must be smaller than context_window_tokens".into(),
            ));
        }

        if self.prompt_char_cap == Some(0) {
            return Err(ConfigError::ValidationError(
                "prompt_char_cap must be > 0 when set".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.top_p <= 0.0 || self.top_p > 1.0 {
            return Err(ConfigError::ValidationError(
                "top_p must be in (0.0, 1.0]".into(),
            ));
        }

        if self.rules_per_section == 0 || self.max_sections == 0 {
            return Err(ConfigError::ValidationError(
                "rules_per_section and max_sections must be > 0".into(),
            ));
        }

        if self.system_instruction.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "system_instruction must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Hard cap on rendered prompt characters, derived from the context window.
    pub fn prompt_char_limit(&self) -> usize {
        let derived = (self.context_window_tokens - self.max_new_tokens) * self.chars_per_token;
        match self.prompt_char_cap {
            Some(cap) => cap.min(derived),
            None => derived,
        }
    }

    /// Generate a default config TOML string (for `rulebook config`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid override for '{field}': {reason}")]
    Override { field: String, reason: String },
}

/// Errors in the router and provider documents shipped inside a pack.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DocumentError {
    #[error("Invalid JSON: {0}")]
    Parse(String),

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Entity pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },
}
