//! Configuration management for goalpilot.
//!
//! Configuration can be set via environment variables:
//! - `GOALPILOT_API_KEY` - Required. API key for the inference backend.
//! - `GOALPILOT_API_BASE` - Optional. Base URL of the generateContent endpoint family.
//! - `GOALPILOT_REQUEST_TIMEOUT_SECS` - Optional. Inference request timeout. Defaults to `30`.
//! - `GOALPILOT_TEMPERATURE` - Optional. Sampling temperature. Defaults to `0.7`.
//! - `GOALPILOT_MAX_OUTPUT_TOKENS` - Optional. Response token cap. Defaults to `8192`.
//! - `GOALPILOT_DATA_DIR` - Optional. Directory for cache and settings files. Defaults to `.goalpilot`.
//! - `GOALPILOT_MODES_FILE` - Optional. YAML file overriding the builtin efficiency modes.
//! - `GOALPILOT_MAX_FAILURES` - Optional. Failed-step threshold that aborts a plan. Defaults to `3`.
//! - `GOALPILOT_QUEUE_MAX_RETRIES` - Optional. Replay attempts before a queued request is dropped. Defaults to `5`.
//! - `GOALPILOT_STEP_DELAY_MS` - Optional. Pacing delay after a successful step. Defaults to `500`.
//! - `GOALPILOT_TOOL_CACHE_TTL_MINUTES` - Optional. TTL for cached tool results. Defaults to `1440`.
//! - `GOALPILOT_QUEUE_TTL_MINUTES` - Optional. TTL for offline queue entries. Defaults to `10080`.
//! - `GOALPILOT_CACHE_SWEEP_MINUTES` - Optional. Background sweep interval. Defaults to `30`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Inference backend API key
    pub api_key: String,

    /// Base URL of the inference endpoint family
    pub api_base: String,

    /// Timeout for one inference request, in seconds
    pub request_timeout_secs: u64,

    /// Sampling temperature passed to the model
    pub temperature: f64,

    /// Response token cap passed to the model
    pub max_output_tokens: u64,

    /// Directory holding the cache snapshot and settings file
    pub data_dir: PathBuf,

    /// Optional YAML file overriding the builtin efficiency modes
    pub modes_file: Option<PathBuf>,

    /// Failed-step count at which plan execution stops
    pub max_failures: u32,

    /// Replay attempts before a queued request is dropped
    pub queue_max_retries: u32,

    /// Pacing delay inserted after each successful step, in milliseconds
    pub step_delay_ms: u64,

    /// TTL for cached tool results, in minutes
    pub tool_cache_ttl_minutes: i64,

    /// TTL for the offline request queue, in minutes
    pub queue_ttl_minutes: i64,

    /// Interval between background cache sweeps, in minutes
    pub cache_sweep_minutes: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `GOALPILOT_API_KEY` is not set,
    /// or `ConfigError::InvalidValue` naming the variable that failed to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("GOALPILOT_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("GOALPILOT_API_KEY".to_string()))?;

        let api_base =
            std::env::var("GOALPILOT_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        let request_timeout_secs = parse_var("GOALPILOT_REQUEST_TIMEOUT_SECS", 30)?;
        let temperature = parse_var("GOALPILOT_TEMPERATURE", 0.7)?;
        let max_output_tokens = parse_var("GOALPILOT_MAX_OUTPUT_TOKENS", 8192)?;

        let data_dir = std::env::var("GOALPILOT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".goalpilot"));

        let modes_file = std::env::var("GOALPILOT_MODES_FILE").ok().map(PathBuf::from);

        let max_failures = parse_var("GOALPILOT_MAX_FAILURES", 3)?;
        let queue_max_retries = parse_var("GOALPILOT_QUEUE_MAX_RETRIES", 5)?;
        let step_delay_ms = parse_var("GOALPILOT_STEP_DELAY_MS", 500)?;
        let tool_cache_ttl_minutes = parse_var("GOALPILOT_TOOL_CACHE_TTL_MINUTES", 1440)?;
        let queue_ttl_minutes = parse_var("GOALPILOT_QUEUE_TTL_MINUTES", 10080)?;
        let cache_sweep_minutes = parse_var("GOALPILOT_CACHE_SWEEP_MINUTES", 30)?;

        Ok(Self {
            api_key,
            api_base,
            request_timeout_secs,
            temperature,
            max_output_tokens,
            data_dir,
            modes_file,
            max_failures,
            queue_max_retries,
            step_delay_ms,
            tool_cache_ttl_minutes,
            queue_ttl_minutes,
            cache_sweep_minutes,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, data_dir: PathBuf) -> Self {
        Self {
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_secs: 30,
            temperature: 0.7,
            max_output_tokens: 8192,
            data_dir,
            modes_file: None,
            max_failures: 3,
            queue_max_retries: 5,
            step_delay_ms: 500,
            tool_cache_ttl_minutes: 1440,
            queue_ttl_minutes: 10080,
            cache_sweep_minutes: 30,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}
