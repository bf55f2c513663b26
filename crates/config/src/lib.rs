//! Configuration loading, validation, and management for ironloop.
//!
//! Loads configuration from `~/.ironloop/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Tokens kept free for the model's answer; `openai.max_tokens` must exceed it.
const RESPONSE_RESERVE_TOKENS: usize = 1000;

/// The root configuration structure.
///
/// Maps directly to `~/.ironloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Main chat backend
    #[serde(default)]
    pub backend: BackendKind,

    /// Goal to achieve (ignored if `prompt` is set)
    #[serde(default)]
    pub goal: String,

    /// Prompt to use instead of the built-in template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Model requested from the hosted API
    #[serde(default = "default_model")]
    pub model: String,

    /// HTTP proxy for outbound requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// Root directory for command side effects
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Transcript directory; unset logs only through tracing
    #[serde(default = "default_log_dir", skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Step budget for auto mode, 0 runs until exit
    #[serde(default)]
    pub steps: usize,

    /// Where unparseable model output is dumped
    #[serde(default = "default_debug_dir")]
    pub debug_dir: PathBuf,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub bulk: BulkConfig,
}

fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_output() -> PathBuf {
    PathBuf::from("output")
}
fn default_log_dir() -> Option<PathBuf> {
    Some(PathBuf::from("logs"))
}
fn default_debug_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_wait_secs() -> u64 {
    5
}

/// Which backend drives the main chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI-compatible chat completions API
    #[default]
    OpenAi,
    /// Real-time websocket chat backend
    Realtime,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::OpenAi => "openai",
            BackendKind::Realtime => "realtime",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(BackendKind::OpenAi),
            "realtime" => Ok(BackendKind::Realtime),
            other => Err(ConfigError::ValidationError(format!(
                "unknown backend: {other} (expected openai or realtime)"
            ))),
        }
    }
}

/// Hosted completion API settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Base pause between requests
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,

    /// Context budget per request, 0 disables pruning
    #[serde(default = "default_openai_max_tokens")]
    pub max_tokens: usize,

    /// Back-off after a 429
    #[serde(default = "default_retry_wait_secs")]
    pub retry_wait_secs: u64,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_openai_max_tokens() -> usize {
    5000
}
fn default_retry_wait_secs() -> u64 {
    30
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            wait_secs: default_wait_secs(),
            max_tokens: default_openai_max_tokens(),
            retry_wait_secs: default_retry_wait_secs(),
        }
    }
}

/// Conversation tone requested from the real-time backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStyle {
    Creative,
    #[default]
    Balanced,
    Precise,
}

/// Real-time socket backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Base pause between requests
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,

    /// TOML file holding the captured browser session
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,

    #[serde(default = "default_bootstrap_url")]
    pub bootstrap_url: String,

    #[serde(default = "default_socket_url")]
    pub socket_url: String,

    /// Origin the session cookies are scoped to
    #[serde(default = "default_origin")]
    pub origin: String,

    #[serde(default)]
    pub style: ConversationStyle,
}

fn default_session_file() -> PathBuf {
    PathBuf::from("realtime-session.toml")
}
fn default_bootstrap_url() -> String {
    "https://www.bing.com/turing/conversation/create".into()
}
fn default_socket_url() -> String {
    "wss://sydney.bing.com/sydney/ChatHub".into()
}
fn default_origin() -> String {
    "https://www.bing.com".into()
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            wait_secs: default_wait_secs(),
            session_file: default_session_file(),
            bootstrap_url: default_bootstrap_url(),
            socket_url: default_socket_url(),
            origin: default_origin(),
            style: ConversationStyle::default(),
        }
    }
}

/// Web search collaborator settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Search engine ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cx: Option<String>,

    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
}

fn default_search_endpoint() -> String {
    "https://www.googleapis.com/customsearch/v1".into()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            key: None,
            cx: None,
            endpoint: default_search_endpoint(),
        }
    }
}

impl SearchConfig {
    pub fn is_configured(&self) -> bool {
        self.key.as_deref().is_some_and(|k| !k.is_empty())
            && self.cx.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Bulk mode input and output files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("backend", &self.backend)
            .field("goal", &self.goal)
            .field("prompt", &self.prompt)
            .field("model", &self.model)
            .field("proxy", &self.proxy)
            .field("output", &self.output)
            .field("log_dir", &self.log_dir)
            .field("steps", &self.steps)
            .field("debug_dir", &self.debug_dir)
            .field("openai", &self.openai)
            .field("realtime", &self.realtime)
            .field("search", &self.search)
            .field("bulk", &self.bulk)
            .finish()
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("wait_secs", &self.wait_secs)
            .field("max_tokens", &self.max_tokens)
            .field("retry_wait_secs", &self.retry_wait_secs)
            .finish()
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("key", &redact(&self.key))
            .field("cx", &self.cx)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ironloop/config.toml).
    ///
    /// Environment variables then override the file:
    /// - `IRONLOOP_BACKEND`, `IRONLOOP_MODEL`
    /// - `IRONLOOP_OPENAI_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `IRONLOOP_SEARCH_KEY`, `IRONLOOP_SEARCH_CX`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from a specific path, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
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

    /// Apply overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(backend) = non_empty("IRONLOOP_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Some(model) = non_empty("IRONLOOP_MODEL") {
            self.model = model;
        }
        if let Some(key) = non_empty("IRONLOOP_OPENAI_KEY") {
            self.openai.api_key = Some(key);
        } else if self.openai.api_key.is_none() {
            self.openai.api_key = non_empty("OPENAI_API_KEY");
        }
        if let Some(key) = non_empty("IRONLOOP_SEARCH_KEY") {
            self.search.key = Some(key);
        }
        if let Some(cx) = non_empty("IRONLOOP_SEARCH_CX") {
            self.search.cx = Some(cx);
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ironloop")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.openai.max_tokens != 0 && self.openai.max_tokens <= RESPONSE_RESERVE_TOKENS {
            return Err(ConfigError::ValidationError(format!(
                "openai.max_tokens must be 0 (unbounded) or greater than {RESPONSE_RESERVE_TOKENS}"
            )));
        }

        if self.output.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "output directory must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// The prompt for modes driven by a template: an explicit prompt wins,
    /// otherwise the goal must be set.
    pub fn has_goal_or_prompt(&self) -> bool {
        !self.goal.trim().is_empty() || self.prompt.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            goal: String::new(),
            prompt: None,
            model: default_model(),
            proxy: None,
            output: default_output(),
            log_dir: default_log_dir(),
            steps: 0,
            debug_dir: default_debug_dir(),
            openai: OpenAiConfig::default(),
            realtime: RealtimeConfig::default(),
            search: SearchConfig::default(),
            bulk: BulkConfig::default(),
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
