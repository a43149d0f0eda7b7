//! Configuration management

use anyhow::{bail, Result};
use std::time::Duration;

use crate::agent::engine::EngineConfig;
use crate::agent::recovery::RetryPolicy;
use crate::claude::{ANTHROPIC_API_URL, DEFAULT_MODEL_ID};
use crate::segmentation::SegmentationPolicy;

/// Upper bound for AUTONOMY_MAX_RETRIES
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Upper bound for AUTONOMY_BACKOFF_BASE_SECS
pub const MAX_BACKOFF_BASE_SECS: f64 = 300.0;

/// Process configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Anthropic API key (optional - model calls fail fast without it)
    pub anthropic_api_key: Option<String>,

    /// Model id sent to the Messages API
    pub model_id: String,

    /// Messages API endpoint
    pub api_url: String,

    /// Retries after a throttled call
    pub max_retries: u32,

    /// Base of the exponential backoff, in seconds
    pub backoff_base_secs: f64,

    /// Segmentation prefixes and income cut-offs
    pub segmentation: SegmentationPolicy,

    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            model_id: DEFAULT_MODEL_ID.to_string(),
            api_url: ANTHROPIC_API_URL.to_string(),
            max_retries: 3,
            backoff_base_secs: 3.0,
            segmentation: SegmentationPolicy::default(),
            engine: EngineConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let model_id = std::env::var("AUTONOMY_MODEL_ID").unwrap_or(defaults.model_id);
        let api_url = std::env::var("AUTONOMY_API_URL").unwrap_or(defaults.api_url);

        let max_retries = env_parse("AUTONOMY_MAX_RETRIES").unwrap_or(defaults.max_retries);
        let backoff_base_secs = env_parse("AUTONOMY_BACKOFF_BASE_SECS").unwrap_or(defaults.backoff_base_secs);

        let mut segmentation = defaults.segmentation;
        if let Ok(prefixes) = std::env::var("SEGMENT_URBAN_PREFIXES") {
            segmentation.urban_prefixes = parse_prefixes(&prefixes);
        }
        if let Some(max) = env_parse("SEGMENT_RURAL_INCOME_MAX") {
            segmentation.rural_income_max = max;
        }
        if let Some(min) = env_parse("SEGMENT_URBAN_INCOME_MIN") {
            segmentation.urban_income_min = min;
        }

        let config = Self {
            anthropic_api_key,
            model_id,
            api_url,
            max_retries,
            backoff_base_secs,
            segmentation,
            engine: defaults.engine,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.backoff_base_secs.is_finite() && self.backoff_base_secs > 0.0) {
            bail!("AUTONOMY_BACKOFF_BASE_SECS must be positive, got {}", self.backoff_base_secs);
        }
        if self.backoff_base_secs > MAX_BACKOFF_BASE_SECS {
            bail!(
                "AUTONOMY_BACKOFF_BASE_SECS must be at most {}, got {}",
                MAX_BACKOFF_BASE_SECS,
                self.backoff_base_secs
            );
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            bail!("AUTONOMY_MAX_RETRIES must be at most {}, got {}", MAX_RETRIES_LIMIT, self.max_retries);
        }
        if self.segmentation.rural_income_max >= self.segmentation.urban_income_min {
            bail!(
                "SEGMENT_RURAL_INCOME_MAX ({}) must be below SEGMENT_URBAN_INCOME_MIN ({})",
                self.segmentation.rural_income_max,
                self.segmentation.urban_income_min
            );
        }
        Ok(())
    }

    /// Progressive model-invocation policy with the configured retry budget
    ///
    /// Out-of-range values are clamped; `validate` reports them.
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::model_invocation();
        let base_delay = Duration::try_from_secs_f64(self.backoff_base_secs.min(MAX_BACKOFF_BASE_SECS))
            .unwrap_or(policy.base_delay);
        policy
            .with_max_retries(self.max_retries.min(MAX_RETRIES_LIMIT))
            .with_base_delay(base_delay)
    }
}

/// Comma-separated prefixes; blanks dropped
pub fn parse_prefixes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
