//! TOML Configuration File Support
//!
//! Configuration lives at `$XDG_CONFIG_HOME/slidesmith/config.toml`
//! (typically `~/.config/slidesmith/config.toml`).
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments, applied with [`ConfigOverrides`]
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [llm]
//! api_key = "sk-..."
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4o"
//! max_tokens = 16384
//! temperature = 0.7
//!
//! [server]
//! url = "http://localhost:3001"
//!
//! [generation]
//! slide_count = 10
//! aspect_ratio = "16:9"
//! style = "professional"
//!
//! [limits]
//! max_requests = 10
//! window_secs = 60
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::OpenAiBackend;
use crate::limit::RequestLimiter;
use crate::prompt::{AspectRatio, SlideStyle, MAX_SLIDES, MIN_SLIDES};
use crate::source::GenerationDefaults;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[llm]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmToml {
    /// Bearer token for the completions endpoint
    pub api_key: Option<String>,
    /// OpenAI-compatible base URL
    pub base_url: Option<String>,
    /// Model identifier
    pub model: Option<String>,
    /// Response token cap
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
}

/// `[server]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Base URL of a slidesmith-compatible server
    pub url: Option<String>,
}

/// `[generation]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationToml {
    /// Default number of slides
    pub slide_count: Option<u32>,
    /// Default aspect ratio, e.g. `"16:9"`
    pub aspect_ratio: Option<String>,
    /// Default visual style, e.g. `"professional"`
    pub style: Option<String>,
}

/// `[limits]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsToml {
    /// Requests allowed per window (0 disables limiting)
    pub max_requests: Option<u32>,
    /// Window length in seconds
    pub window_secs: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlidesmithToml {
    /// Model endpoint
    pub llm: LlmToml,
    /// Remote server
    pub server: ServerToml,
    /// Request defaults
    pub generation: GenerationToml,
    /// Request limiter
    pub limits: LimitsToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved configuration
#[derive(Clone, Debug)]
pub struct SlidesmithConfig {
    /// Bearer token (empty for local servers)
    pub api_key: String,
    /// OpenAI-compatible base URL
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Response token cap
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Server to stream from; `None` calls the model directly
    pub server_url: Option<String>,
    /// Default number of slides
    pub slide_count: u32,
    /// Default aspect ratio
    pub aspect_ratio: AspectRatio,
    /// Default visual style
    pub style: SlideStyle,
    /// Requests allowed per window (0 disables limiting)
    pub max_requests: u32,
    /// Limiter window
    pub window: Duration,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    /// Source of configuration values
    source: ConfigSource,
}

impl Default for SlidesmithConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: crate::backend::DEFAULT_BASE_URL.to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 16384,
            temperature: 0.7,
            server_url: None,
            slide_count: 10,
            aspect_ratio: AspectRatio::Wide,
            style: SlideStyle::Professional,
            max_requests: 0,
            window: Duration::from_secs(60),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl SlidesmithConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check ranges that parsing alone cannot
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SLIDES..=MAX_SLIDES).contains(&self.slide_count) {
            return Err(ConfigError::ValidationError(format!(
                "slide_count must be between 1 and 20, got {}",
                self.slide_count
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        if self.max_requests > 0 && self.window.is_zero() {
            return Err(ConfigError::ValidationError(
                "window_secs must be positive when max_requests is set".to_string(),
            ));
        }
        Ok(())
    }

    /// Model settings for requests without their own override
    #[must_use]
    pub fn generation_defaults(&self) -> GenerationDefaults {
        GenerationDefaults {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Backend for the configured endpoint
    #[must_use]
    pub fn backend(&self) -> OpenAiBackend {
        OpenAiBackend::new(self.api_key.clone(), self.base_url.clone())
    }

    /// Limiter for the configured window
    #[must_use]
    pub fn limiter(&self) -> RequestLimiter {
        if self.max_requests == 0 {
            RequestLimiter::disabled()
        } else {
            RequestLimiter::new(self.max_requests, self.window)
        }
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/slidesmith/config.toml` or
/// `~/.config/slidesmith/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("slidesmith").join("config.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if a
/// resolved value is out of range. A missing config file is not an error.
pub fn load_config() -> Result<SlidesmithConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<SlidesmithConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<SlidesmithConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = SlidesmithConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: SlidesmithToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut SlidesmithConfig, toml: &SlidesmithToml) -> Result<(), ConfigError> {
    // LLM settings
    if let Some(ref key) = toml.llm.api_key {
        config.api_key.clone_from(key);
    }
    if let Some(ref url) = toml.llm.base_url {
        config.base_url.clone_from(url);
    }
    if let Some(ref model) = toml.llm.model {
        config.model.clone_from(model);
    }
    if let Some(tokens) = toml.llm.max_tokens {
        config.max_tokens = tokens;
    }
    if let Some(temperature) = toml.llm.temperature {
        config.temperature = temperature;
    }

    // Server
    if toml.server.url.is_some() {
        config.server_url.clone_from(&toml.server.url);
    }

    // Generation defaults
    if let Some(count) = toml.generation.slide_count {
        config.slide_count = count;
    }
    if let Some(ref ratio) = toml.generation.aspect_ratio {
        config.aspect_ratio = ratio
            .parse()
            .map_err(|e: crate::prompt::RequestError| ConfigError::ValidationError(e.to_string()))?;
    }
    if let Some(ref style) = toml.generation.style {
        config.style = style
            .parse()
            .map_err(|e: crate::prompt::RequestError| ConfigError::ValidationError(e.to_string()))?;
    }

    // Limits
    if let Some(max) = toml.limits.max_requests {
        config.max_requests = max;
    }
    if let Some(secs) = toml.limits.window_secs {
        config.window = Duration::from_secs(secs);
    }

    Ok(())
}

/// Apply environment variable overrides to the config
///
/// Unparseable numbers are ignored with a warning.
fn apply_env_config<F>(config: &mut SlidesmithConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = env("OPENAI_API_KEY") {
        config.api_key = key;
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env("OPENAI_API_BASE") {
        config.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(model) = env("OPENAI_MODEL") {
        config.model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(tokens) = parse_env(&env, "OPENAI_MAX_TOKENS") {
        config.max_tokens = tokens;
        config.source = ConfigSource::Env;
    }
    if let Some(temperature) = parse_env(&env, "OPENAI_TEMPERATURE") {
        config.temperature = temperature;
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env("SLIDESMITH_SERVER_URL") {
        config.server_url = Some(url).filter(|u| !u.trim().is_empty());
        config.source = ConfigSource::Env;
    }
    if let Some(max) = parse_env(&env, "SLIDESMITH_MAX_REQUESTS") {
        config.max_requests = max;
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = parse_env(&env, "SLIDESMITH_WINDOW_SECS") {
        config.window = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
}

fn parse_env<F, V>(env: &F, key: &str) -> Option<V>
where
    F: Fn(&str) -> Option<String>,
    V: std::str::FromStr,
{
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = key, value = %raw, "Ignoring unparseable environment value");
            None
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Model override
    pub model: Option<String>,
    /// Server URL override
    pub server_url: Option<String>,
    /// Slide count override
    pub slide_count: Option<u32>,
    /// Aspect ratio override
    pub aspect_ratio: Option<AspectRatio>,
    /// Style override
    pub style: Option<SlideStyle>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Set server URL override
    #[must_use]
    pub fn with_server_url(mut self, url: String) -> Self {
        self.server_url = Some(url);
        self
    }

    /// Set slide count override
    #[must_use]
    pub fn with_slide_count(mut self, count: u32) -> Self {
        self.slide_count = Some(count);
        self
    }

    /// Set aspect ratio override
    #[must_use]
    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = Some(ratio);
        self
    }

    /// Set style override
    #[must_use]
    pub fn with_style(mut self, style: SlideStyle) -> Self {
        self.style = Some(style);
        self
    }

    /// Whether no override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.model.is_none()
            && self.server_url.is_none()
            && self.slide_count.is_none()
            && self.aspect_ratio.is_none()
            && self.style.is_none()
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if an override is out of range.
    pub fn apply(&self, config: &mut SlidesmithConfig) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Ok(());
        }
        if let Some(ref model) = self.model {
            config.model.clone_from(model);
        }
        if self.server_url.is_some() {
            config.server_url.clone_from(&self.server_url);
        }
        if let Some(count) = self.slide_count {
            config.slide_count = count;
        }
        if let Some(ratio) = self.aspect_ratio {
            config.aspect_ratio = ratio;
        }
        if let Some(style) = self.style {
            config.style = style;
        }
        config.source = ConfigSource::Cli;
        config.validate()
    }
}
