//! Configuration for the healing pipeline
//!
//! Built with the `config` crate: hard defaults layered under `IASO_*`
//! environment overrides, so a bare deployment runs with the documented
//! defaults (threshold 5, k 3) and operators tune via environment only.
//!
//! The Anthropic API key is not part of this struct; the oracle client
//! reads `ANTHROPIC_API_KEY` directly.

use crate::error::Result;
use serde::Deserialize;
use std::time::Duration;

/// Tunables for one healing pipeline deployment
#[derive(Debug, Clone, Deserialize)]
pub struct HealingConfig {
    /// Minimum eligible interaction count before a run does any work
    pub feedback_threshold: usize,

    /// Neighbor count for the dedup similarity search
    pub similarity_k: usize,

    /// Provenance tag stamped on every synthesized snippet
    pub provenance_tag: String,

    /// Persona/brand grounding preamble passed to the generator oracle
    pub persona_prompt: String,

    /// Fast classifier-style model for the judge oracle
    pub judge_model: String,

    /// Slower generator model for knowledge synthesis
    pub generator_model: String,

    /// Max tokens for oracle responses
    pub max_tokens: usize,

    /// Sampling temperature for oracle calls
    pub temperature: f32,

    /// Per-oracle-call timeout in seconds
    pub oracle_timeout_secs: u64,

    /// Local embedding model name (fastembed)
    pub embedding_model: String,

    /// Embedding vector dimensionality (must match the model)
    pub embedding_dimensions: usize,

    /// Interval between scheduled runs in seconds
    pub run_interval_secs: u64,

    /// Upper bound on one run's wall time in seconds
    pub max_run_duration_secs: u64,
}

impl HealingConfig {
    /// Load configuration from defaults overridden by `IASO_*` env vars,
    /// e.g. `IASO_FEEDBACK_THRESHOLD=10`
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        let cfg = config::Config::builder()
            .set_default("feedback_threshold", defaults.feedback_threshold as i64)?
            .set_default("similarity_k", defaults.similarity_k as i64)?
            .set_default("provenance_tag", defaults.provenance_tag)?
            .set_default("persona_prompt", defaults.persona_prompt)?
            .set_default("judge_model", defaults.judge_model)?
            .set_default("generator_model", defaults.generator_model)?
            .set_default("max_tokens", defaults.max_tokens as i64)?
            .set_default("temperature", defaults.temperature as f64)?
            .set_default("oracle_timeout_secs", defaults.oracle_timeout_secs as i64)?
            .set_default("embedding_model", defaults.embedding_model)?
            .set_default(
                "embedding_dimensions",
                defaults.embedding_dimensions as i64,
            )?
            .set_default("run_interval_secs", defaults.run_interval_secs as i64)?
            .set_default(
                "max_run_duration_secs",
                defaults.max_run_duration_secs as i64,
            )?
            .add_source(config::Environment::with_prefix("IASO"))
            .build()?;

        Ok(cfg.try_deserialize()?)
    }

    /// Timeout applied to each external oracle call
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }

    /// Interval between scheduled pipeline runs
    pub fn run_interval(&self) -> Duration {
        Duration::from_secs(self.run_interval_secs)
    }

    /// Upper bound on a single run's duration
    pub fn max_run_duration(&self) -> Duration {
        Duration::from_secs(self.max_run_duration_secs)
    }
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            feedback_threshold: 5,
            similarity_k: 3,
            provenance_tag: "self-healing-feedback".to_string(),
            persona_prompt: "You are a helpful, accurate support assistant. \
                             Answer the user's question clearly and concisely, \
                             staying grounded in facts you are confident about. \
                             If the question is ambiguous, answer the most \
                             common interpretation."
                .to_string(),
            judge_model: "claude-3-5-haiku-20241022".to_string(),
            generator_model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: 1024,
            temperature: 0.3,
            oracle_timeout_secs: 60,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_dimensions: 384,
            run_interval_secs: 3600,
            max_run_duration_secs: 1800,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = HealingConfig::default();
        assert_eq!(config.feedback_threshold, 5);
        assert_eq!(config.similarity_k, 3);
        assert_eq!(config.provenance_tag, "self-healing-feedback");
    }

    #[test]
    fn test_duration_helpers() {
        let config = HealingConfig::default();
        assert_eq!(config.oracle_timeout(), Duration::from_secs(60));
        assert_eq!(config.run_interval(), Duration::from_secs(3600));
        assert_eq!(config.max_run_duration(), Duration::from_secs(1800));
    }

    #[test]
    fn test_load_uses_defaults() {
        // No IASO_* vars are set in the test environment for these keys
        let config = HealingConfig::load().unwrap();
        assert_eq!(config.similarity_k, 3);
        assert_eq!(config.embedding_dimensions, 384);
    }
}
