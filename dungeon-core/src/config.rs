//! Game settings.
//!
//! Settings are read from a TOML file whose keys match the names shown in
//! the in-game settings listing (`temp`, `top-keks`, `action-sugg`, ...).
//! Every key is optional; missing keys take the defaults below. A handful of
//! environment variables override the file so a hosted deployment can point
//! at a different backend without editing it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Unknown setting `{0}`, expected temp, top-p, top-keks, rep-pen, rep-pen-range or rep-pen-slope")]
    UnknownKey(String),
}

/// Typed game settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    /// Higher values make the AI more random.
    pub temp: f32,

    /// Controls how repetitive the AI is allowed to be.
    pub rep_pen: f32,

    /// How many tokens are affected by the repetition penalty.
    pub rep_pen_range: u32,

    /// Penalty curve slope. Kept for save compatibility; Ollama ignores it.
    pub rep_pen_slope: f32,

    /// Number of words the AI can randomly choose from (top-k).
    #[serde(rename = "top-keks")]
    pub top_k: u32,

    /// Nucleus sampling threshold.
    pub top_p: f32,

    /// How many actions to suggest each turn; 0 is off.
    #[serde(rename = "action-sugg")]
    pub action_suggestions: usize,

    /// How many of those may come from the keyword tables.
    #[serde(rename = "keyword-sugg")]
    pub keyword_suggestions: usize,

    /// Roll a d20 to flavour how well player actions go.
    pub action_d20: bool,

    /// How random the suggested actions are.
    pub action_temp: f32,

    /// Save after every action.
    pub autosave: bool,

    /// Approximate number of tokens to generate per turn.
    pub generate_num: u32,

    /// Log verbosity: 10 trace, 20 debug, 30 info, 40 warn, 50 error.
    pub log_level: u8,

    pub ollama_host: String,
    pub ollama_model: String,

    /// Request timeout in seconds.
    pub ollama_timeout: u64,

    /// Compact history once the transcript holds more turns than this.
    pub summarize_threshold: usize,

    /// Number of oldest turns folded into each summary.
    pub summarize_chunk: usize,

    /// Similarity above which two consecutive results count as looping.
    pub loop_threshold: f64,

    /// Prefix every prompt with the stay-in-character instruction.
    pub in_character: bool,

    /// Directory holding save files.
    pub saves_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            temp: 0.4,
            rep_pen: 1.2,
            rep_pen_range: 512,
            rep_pen_slope: 3.33,
            top_k: 20,
            top_p: 0.9,
            action_suggestions: 4,
            keyword_suggestions: 2,
            action_d20: true,
            action_temp: 1.0,
            autosave: true,
            generate_num: 60,
            log_level: 30,
            ollama_host: ollama::DEFAULT_HOST.to_string(),
            ollama_model: ollama::DEFAULT_MODEL.to_string(),
            ollama_timeout: ollama::DEFAULT_TIMEOUT_SECS,
            summarize_threshold: 10,
            summarize_chunk: 8,
            loop_threshold: 0.9,
            in_character: false,
            saves_dir: PathBuf::from("saves"),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut settings = Self::from_toml_str(&content)?;
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Like [`Settings::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }

        tracing::info!(path = %path.display(), "No settings file, using defaults");
        let mut settings = Self::default();
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text without validating.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `OLLAMA_HOST`, `OLLAMA_MODEL`, `OLLAMA_TIMEOUT` and
    /// `ACTION_SUGGESTIONS` from the given lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OLLAMA_HOST") {
            self.ollama_host = host;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.ollama_model = model;
        }
        if let Some(raw) = lookup("OLLAMA_TIMEOUT") {
            self.ollama_timeout = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "ollama-timeout",
                reason: format!("{raw:?} is not a number of seconds ({e})"),
            })?;
        }
        if let Some(raw) = lookup("ACTION_SUGGESTIONS") {
            self.action_suggestions = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "action-sugg",
                reason: format!("{raw:?} is not a count ({e})"),
            })?;
        }
        Ok(())
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(key: &'static str, reason: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                key,
                reason: reason.into(),
            })
        }

        if !(self.temp >= 0.0) {
            return invalid("temp", "must be zero or greater");
        }
        if !(self.action_temp >= 0.0) {
            return invalid("action-temp", "must be zero or greater");
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return invalid("top-p", "must be in (0, 1]");
        }
        if !(self.rep_pen > 0.0) {
            return invalid("rep-pen", "must be positive");
        }
        if self.generate_num == 0 {
            return invalid("generate-num", "must be at least 1");
        }
        if self.summarize_chunk == 0 {
            return invalid("summarize-chunk", "must be at least 1");
        }
        if self.summarize_chunk > self.summarize_threshold {
            return invalid(
                "summarize-chunk",
                format!(
                    "must not exceed summarize-threshold ({})",
                    self.summarize_threshold
                ),
            );
        }
        if !(0.0..=1.0).contains(&self.loop_threshold) {
            return invalid("loop-threshold", "must be in [0, 1]");
        }
        if self.ollama_host.trim().is_empty() {
            return invalid("ollama-host", "must not be empty");
        }
        if self.ollama_model.trim().is_empty() {
            return invalid("ollama-model", "must not be empty");
        }
        Ok(())
    }

    /// The sampling regime a new story snapshots.
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams::from(self)
    }

    /// Request timeout for the completion backend.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.ollama_timeout)
    }

    /// Default `tracing` level for the `log-level` setting.
    pub fn log_directive(&self) -> &'static str {
        match self.log_level {
            0..=10 => "trace",
            11..=20 => "debug",
            21..=30 => "info",
            31..=40 => "warn",
            _ => "error",
        }
    }
}

/// Sampling parameters a story was created with.
///
/// Snapshotted from [`Settings`] when a story starts and written into every
/// save, so a reloaded story keeps its original regime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repetition_penalty: f32,
    pub repetition_penalty_range: u32,
    pub repetition_penalty_slope: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for SamplingParams {
    fn from(settings: &Settings) -> Self {
        Self {
            temperature: settings.temp,
            top_p: settings.top_p,
            top_k: settings.top_k,
            repetition_penalty: settings.rep_pen,
            repetition_penalty_range: settings.rep_pen_range,
            repetition_penalty_slope: settings.rep_pen_slope,
        }
    }
}

impl SamplingParams {
    /// Same ranges as [`Settings::validate`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key, reason: &str| ConfigError::Invalid {
            key,
            reason: reason.to_string(),
        };

        if !(self.temperature >= 0.0) {
            return Err(invalid("temp", "must be zero or greater"));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(invalid("top-p", "must be in (0, 1]"));
        }
        if !(self.repetition_penalty > 0.0) {
            return Err(invalid("rep-pen", "must be positive"));
        }
        if !self.repetition_penalty_slope.is_finite() {
            return Err(invalid("rep-pen-slope", "must be a finite number"));
        }
        Ok(())
    }

    /// Set one parameter by its settings key. On error nothing changes.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
        where
            T: std::str::FromStr,
            T::Err: std::fmt::Display,
        {
            value.trim().parse().map_err(|e| ConfigError::Invalid {
                key,
                reason: format!("{value:?} is not a valid number ({e})"),
            })
        }

        let mut next = *self;
        match key.trim().to_lowercase().as_str() {
            "temp" => next.temperature = parse("temp", value)?,
            "top-p" => next.top_p = parse("top-p", value)?,
            "top-keks" => next.top_k = parse("top-keks", value)?,
            "rep-pen" => next.repetition_penalty = parse("rep-pen", value)?,
            "rep-pen-range" => next.repetition_penalty_range = parse("rep-pen-range", value)?,
            "rep-pen-slope" => next.repetition_penalty_slope = parse("rep-pen-slope", value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}
