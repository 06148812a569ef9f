//! Engine configuration
//!
//! One TOML file with a table per concern. Every table and field is optional;
//! anything omitted takes the built-in default.
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [selection]
//! min_score_threshold = 60.0
//! budget_strategy = "best-fit-continue"
//!
//! [scoring]
//! context_window = 3
//! min_interval_ms = 500
//! failure_policy = "skip"
//!
//! [anthropic]
//! model = "claude-sonnet-4-20250514"
//! ```
//!
//! The Anthropic API key resolves Environment → TOML.

use crate::error::{EngineError, EngineResult};
use crate::fallback::FallbackOptions;
use crate::pipeline::{FailurePolicy, ScoringPolicy};
use crate::selection::SelectionOptions;
use crate::validator::TopicMatch;
use recut_common::config::{load_toml_file, resolve_config_path, LoggingConfig, CONFIG_ENV_VAR};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable holding the Anthropic API key
pub const API_KEY_ENV_VAR: &str = "RECUT_ANTHROPIC_API_KEY";

/// Complete engine configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub logging: LoggingConfig,
    pub selection: SelectionOptions,
    pub fallback: FallbackOptions,
    /// Dependency resolution used when validating orders
    pub topic_match: TopicMatch,
    pub scoring: ScoringSettings,
    pub anthropic: AnthropicSettings,
}

impl EngineConfig {
    /// Load configuration, falling back to defaults when no file exists
    ///
    /// An explicit path or one named by `RECUT_CONFIG` must exist; the OS
    /// default location is optional.
    pub fn load(explicit: Option<&Path>) -> EngineResult<Self> {
        match resolve_config_path(explicit) {
            Some(path) => {
                let config: EngineConfig = load_toml_file(&path)?;
                info!(path = %path.display(), "Loaded engine configuration");
                config.check()?;
                Ok(config)
            }
            None => {
                info!(
                    "No config file found (set {} to choose one), using defaults",
                    CONFIG_ENV_VAR
                );
                Ok(Self::default())
            }
        }
    }

    /// Reject values the engine cannot work with
    pub fn check(&self) -> EngineResult<()> {
        if !self.selection.min_score_threshold.is_finite() {
            return Err(EngineError::InvalidInput(
                "selection.min_score_threshold must be a finite number".to_string(),
            ));
        }
        if self.scoring.initial_backoff_ms > self.scoring.max_backoff_ms {
            return Err(EngineError::InvalidInput(format!(
                "scoring.initial_backoff_ms ({}) exceeds scoring.max_backoff_ms ({})",
                self.scoring.initial_backoff_ms, self.scoring.max_backoff_ms
            )));
        }
        if self.scoring.call_timeout_secs == 0 {
            return Err(EngineError::InvalidInput(
                "scoring.call_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// `[scoring]` table, in file-friendly units
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScoringSettings {
    /// Prior segments passed to the quality oracle
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Minimum spacing between oracle calls; 0 disables rate limiting
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Whole-batch deadline; unset means no deadline
    #[serde(default)]
    pub batch_timeout_secs: Option<u64>,

    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            min_interval_ms: default_min_interval_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            batch_timeout_secs: None,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl ScoringSettings {
    pub fn to_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            context_window: self.context_window,
            min_interval: Duration::from_millis(self.min_interval_ms),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            batch_timeout: self.batch_timeout_secs.map(Duration::from_secs),
            failure_policy: self.failure_policy,
        }
    }
}

fn default_context_window() -> usize {
    3
}

fn default_min_interval_ms() -> u64 {
    500
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    5000
}

/// `[anthropic]` table
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AnthropicSettings {
    /// API key; overridden by `RECUT_ANTHROPIC_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    60
}

/// Resolve the Anthropic API key
///
/// **Priority:** Environment → TOML
pub fn resolve_api_key(settings: &AnthropicSettings) -> EngineResult<String> {
    let env_key = std::env::var(API_KEY_ENV_VAR)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = settings.api_key.as_deref().filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "Anthropic API key found in multiple sources: environment, TOML. Using environment (highest priority)."
        );
    }

    if let Some(key) = env_key {
        info!("Anthropic API key loaded from environment variable");
        return Ok(key.trim().to_string());
    }

    if let Some(key) = toml_key {
        info!("Anthropic API key loaded from TOML config");
        return Ok(key.trim().to_string());
    }

    Err(EngineError::Common(recut_common::Error::Config(format!(
        "Anthropic API key not configured. Set {} or add api_key under [anthropic] in the config file",
        API_KEY_ENV_VAR
    ))))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
