//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Validates all settings at startup.

pub mod selector;

use parley_core::message::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use selector::{LOCAL_AI_FAMILY, LOCAL_AI_KINDS, Selector};

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name the bot answers to; falls back to its display name, then its
    /// local user id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Sender patterns allowed to talk to the bot. Empty = everyone.
    #[serde(default)]
    pub allowed_users: Vec<String>,

    /// Follow reply chains and answer inside threads
    #[serde(default = "default_true")]
    pub reply_in_thread: bool,

    /// Prefix history with sender names for multi-person rooms
    #[serde(default = "default_true")]
    pub enable_multi_user: bool,

    /// System prompt template; `{name}` and `{timestamp}` are interpolated
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Fixed role-tagged prompts injected ahead of live history
    #[serde(default)]
    pub additional_prompt: Vec<PromptEntry>,

    /// Active backend selector (`openai`, `local_ai#ollama`, ...)
    #[serde(default = "default_platform")]
    pub use_platform: String,

    /// Initial model; the active backend's default model when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_model: Option<String>,

    /// Upper bound for one completion call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Configured backends, keyed by name
    #[serde(default = "default_platforms")]
    pub platforms: BTreeMap<String, BackendConfig>,
}

/// A configured, role-tagged prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptEntry {
    pub role: Role,
    pub content: String,
}

/// Configuration of one backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Adapter kind (`openai`, `anthropic`, `ollama`, `lmstudio`);
    /// defaults to the table name
    #[serde(default)]
    pub kind: String,

    /// Base URL of the provider
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model of this backend
    pub model: String,

    /// Word budget of the assembled context
    #[serde(default = "default_max_words")]
    pub max_words: usize,

    /// Message budget of the assembled context
    #[serde(default = "default_max_context_messages")]
    pub max_context_messages: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Provider-specific request fields merged into the request body
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}
fn default_system_prompt() -> String {
    "You are {name}, a friendly assistant chatting in a group room. The current time is {timestamp}."
        .into()
}
fn default_platform() -> String {
    "openai".into()
}
fn default_request_timeout() -> u64 {
    60
}
fn default_max_words() -> usize {
    1000
}
fn default_max_context_messages() -> usize {
    20
}

fn default_platforms() -> BTreeMap<String, BackendConfig> {
    let mut platforms = BTreeMap::new();
    platforms.insert(
        "openai".into(),
        BackendConfig::new("openai", "https://api.openai.com/v1", "gpt-4o-mini"),
    );
    platforms.insert(
        "anthropic".into(),
        BackendConfig {
            max_tokens: Some(4096),
            ..BackendConfig::new("anthropic", "https://api.anthropic.com", "claude-sonnet-4-20250514")
        },
    );
    platforms.insert(
        "ollama".into(),
        BackendConfig::new("ollama", "http://localhost:11434", "llama3.2"),
    );
    platforms.insert(
        "lmstudio".into(),
        BackendConfig::new("lmstudio", "http://localhost:1234", "local-model"),
    );
    platforms
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("max_words", &self.max_words)
            .field("max_context_messages", &self.max_context_messages)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("extra", &self.extra)
            .finish()
    }
}

impl BackendConfig {
    /// A backend with default budgets.
    pub fn new(kind: impl Into<String>, url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            url: url.into(),
            api_key: None,
            model: model.into(),
            max_words: default_max_words(),
            max_context_messages: default_max_context_messages(),
            max_tokens: None,
            temperature: None,
            extra: BTreeMap::new(),
        }
    }

    /// Human-readable `key: value` pairs with the api key redacted.
    pub fn describe(&self) -> Vec<(String, String)> {
        let mut rows = vec![
            ("kind".to_string(), self.kind.clone()),
            ("url".to_string(), self.url.clone()),
            ("api_key".to_string(), redact(&self.api_key).to_string()),
            ("model".to_string(), self.model.clone()),
            ("max_words".to_string(), self.max_words.to_string()),
            (
                "max_context_messages".to_string(),
                self.max_context_messages.to_string(),
            ),
        ];
        if let Some(max_tokens) = self.max_tokens {
            rows.push(("max_tokens".into(), max_tokens.to_string()));
        }
        if let Some(temperature) = self.temperature {
            rows.push(("temperature".into(), temperature.to_string()));
        }
        for (key, value) in &self.extra {
            rows.push((key.clone(), value.to_string()));
        }
        rows
    }
}

/// A selector resolved against the configured backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelector {
    /// Key into `platforms`
    pub name: String,
    /// Canonical selector (`local_ai#ollama` for local kinds)
    pub selector: String,
}

impl AppConfig {
    /// Load configuration from the default path (~/.parley/config.toml),
    /// then apply environment overrides:
    /// - `PARLEY_PLATFORM`: active backend selector
    /// - `PARLEY_MODEL`: initial model
    /// - `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`: keys for backends of that kind
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file path (with env overrides).
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            Self::from_toml(&content).map_err(|e| match e {
                ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                    path: path.to_path_buf(),
                    reason,
                },
                other => other,
            })?
        } else {
            tracing::info!("No config file found at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document and fill in derived fields. Does not validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.normalize();
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    fn normalize(&mut self) {
        for (name, backend) in self.platforms.iter_mut() {
            if backend.kind.trim().is_empty() {
                backend.kind = name.clone();
            }
            backend.url = backend.url.trim_end_matches('/').to_string();
        }
    }

    fn apply_env(&mut self) {
        if let Ok(platform) = std::env::var("PARLEY_PLATFORM") {
            self.use_platform = platform;
        }
        if let Ok(model) = std::env::var("PARLEY_MODEL") {
            self.use_model = Some(model);
        }

        let openai_key = std::env::var("OPENAI_API_KEY").ok();
        let anthropic_key = std::env::var("ANTHROPIC_API_KEY").ok();
        for backend in self.platforms.values_mut() {
            if backend.api_key.is_some() {
                continue;
            }
            backend.api_key = match backend.kind.as_str() {
                "openai" => openai_key.clone(),
                "anthropic" => anthropic_key.clone(),
                _ => None,
            };
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be > 0".into(),
            ));
        }

        if self.platforms.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one platform must be configured".into(),
            ));
        }

        for (name, backend) in &self.platforms {
            if backend.url.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "platforms.{name}.url must not be empty"
                )));
            }
            if backend.max_context_messages == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "platforms.{name}.max_context_messages must be >= 1"
                )));
            }
            if backend.max_words == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "platforms.{name}.max_words must be >= 1"
                )));
            }
            if let Some(t) = backend.temperature {
                if !(0.0..=2.0).contains(&t) {
                    return Err(ConfigError::ValidationError(format!(
                        "platforms.{name}.temperature must be between 0.0 and 2.0"
                    )));
                }
            }
        }

        for pattern in &self.allowed_users {
            regex_lite::Regex::new(pattern).map_err(|e| {
                ConfigError::ValidationError(format!("invalid allowed_users pattern '{pattern}': {e}"))
            })?;
        }

        self.resolve(&self.use_platform)?;
        Ok(())
    }

    /// Resolve a selector to a configured backend.
    pub fn resolve(&self, selector: &str) -> Result<ResolvedSelector, ConfigError> {
        match Selector::parse(selector) {
            Selector::Family(family) => Err(ConfigError::NeedsSubKind {
                help: selector::family_help(&family),
                family,
            }),
            Selector::Backend { family, name } => {
                let backend = self
                    .platforms
                    .get(&name)
                    .ok_or_else(|| ConfigError::UnknownPlatform(selector.trim().to_string()))?;

                if let Some(family) = family {
                    if family != LOCAL_AI_FAMILY || !LOCAL_AI_KINDS.contains(&backend.kind.as_str()) {
                        return Err(ConfigError::UnknownPlatform(selector.trim().to_string()));
                    }
                }

                Ok(ResolvedSelector {
                    selector: selector::canonical(&name, &backend.kind),
                    name,
                })
            }
        }
    }

    /// Look up a backend by name.
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.platforms.get(name)
    }

    /// Canonical selectors of every configured backend.
    pub fn selectors(&self) -> Vec<String> {
        self.platforms
            .iter()
            .map(|(name, b)| selector::canonical(name, &b.kind))
            .collect()
    }

    /// Generate a default config TOML string (for `parley init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: None,
            allowed_users: vec![],
            reply_in_thread: true,
            enable_multi_user: true,
            system_prompt: default_system_prompt(),
            additional_prompt: vec![],
            use_platform: default_platform(),
            use_model: None,
            request_timeout_secs: default_request_timeout(),
            platforms: default_platforms(),
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

    #[error("not found platform: {0}")]
    UnknownPlatform(String),

    #[error("{help}")]
    NeedsSubKind { family: String, help: String },
}

impl From<ConfigError> for parley_core::Error {
    fn from(err: ConfigError) -> Self {
        parley_core::Error::config(err.to_string())
    }
}
