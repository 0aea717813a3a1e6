//! Configuration loaded from `monograph.toml`.
//!
//! [`MonographConfig`] holds every tunable parameter of the pipeline; values
//! absent from the file use sensible defaults. The `ANTHROPIC_API_KEY`
//! environment variable takes precedence over the file for the API key.

use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

use crate::citations::CitationPolicy;
use crate::extract::BatcherConfig;
use crate::selector::SelectorConfig;

/// Top-level configuration for the pipeline orchestrator.
#[derive(Debug, Clone, Deserialize)]
pub struct MonographConfig {
    /// Completion service API key.
    #[serde(default)]
    pub api_key: String,

    /// Model used for enrichment and synthesis calls.
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum retries before a job is marked failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential retry backoff.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Diversity quotas and scoring weights for the select stage.
    #[serde(default)]
    pub selector: SelectorConfig,

    /// Concurrency and timeout policy for the extract stage.
    #[serde(default)]
    pub batcher: BatcherConfig,

    /// Citation marker density policy.
    #[serde(default)]
    pub citations: CitationPolicy,
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for MonographConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            selector: SelectorConfig::default(),
            batcher: BatcherConfig::default(),
            citations: CitationPolicy::default(),
        }
    }
}

impl MonographConfig {
    /// Load configuration from `monograph.toml` in the current directory,
    /// falling back to defaults when the file does not exist.
    pub fn load() -> Result<Self> {
        let path = Path::new("monograph.toml");
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<MonographConfig>(&contents)?
        } else {
            Self::default()
        };

        // Environment takes precedence over the file for the API key.
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY")
            && !key.is_empty()
        {
            config.api_key = key;
        }

        Ok(config)
    }

    /// Backoff delay before re-claiming a retried job:
    /// `base_delay_ms * 2^(attempt - 1)`, exponent capped to keep the
    /// multiplication from overflowing.
    pub fn retry_delay_ms(&self, attempt: u32) -> u64 {
        self.base_delay_ms * 2u64.pow(attempt.saturating_sub(1).min(16))
    }
}
