//! Anthropic-backed judge and generator oracles
//!
//! One client implements both capabilities over the Messages API: a fast
//! haiku-class model answers the strict yes/no coverage question, and a
//! larger model writes improved answers during synthesis.

use crate::config::HealingConfig;
use crate::error::{IasoError, Result};
use crate::oracles::{GeneratorOracle, JudgeOracle, Verdict};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::debug;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Configuration for the Anthropic oracle client
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Anthropic API key
    pub api_key: String,

    /// Fast model for the judge
    pub judge_model: String,

    /// Generator model for synthesis
    pub generator_model: String,

    /// Max tokens for responses
    pub max_tokens: usize,

    /// Temperature for sampling
    pub temperature: f32,
}

impl OracleConfig {
    /// Build oracle settings from the pipeline config, taking the API key
    /// from `ANTHROPIC_API_KEY`
    pub fn from_healing_config(config: &HealingConfig) -> Self {
        Self {
            api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            judge_model: config.judge_model.clone(),
            generator_model: config.generator_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Anthropic Messages API client implementing both oracle traits
pub struct AnthropicOracle {
    config: OracleConfig,
    client: reqwest::Client,
}

/// Anthropic API message format
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: usize,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Anthropic API response format
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    text: String,
}

impl AnthropicOracle {
    /// Create a new oracle client
    pub fn new(config: OracleConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(IasoError::Config(config::ConfigError::Message(
                "ANTHROPIC_API_KEY not set".to_string(),
            )));
        }

        Ok(Self {
            config,
            client: reqwest::Client::new(),
        })
    }

    /// Make an API call to the given model
    async fn call_api(&self, model: &str, system: Option<&str>, prompt: &str) -> Result<String> {
        debug!("Calling Anthropic API (model: {})", model);

        let request = AnthropicRequest {
            model: model.to_string(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: system.map(|s| s.to_string()),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(IasoError::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(IasoError::LlmApi(format!(
                "API request failed with status {}: {}",
                status, error_text
            )));
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| IasoError::LlmApi(format!("Failed to parse response: {}", e)))?;

        api_response
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| IasoError::LlmApi("Empty response from API".to_string()))
    }

    /// Parse the judge's answer under the strict yes/no contract
    ///
    /// Tolerates surrounding whitespace and a trailing period; anything
    /// beyond that is a protocol violation surfaced to the caller.
    fn parse_verdict(response: &str) -> Result<Verdict> {
        let normalized = response.trim().trim_end_matches('.').to_lowercase();
        match normalized.as_str() {
            "yes" => Ok(Verdict::Yes),
            "no" => Ok(Verdict::No),
            _ => Err(IasoError::ProtocolViolation(format!(
                "expected yes/no, got: {:?}",
                response.trim()
            ))),
        }
    }
}

#[async_trait]
impl JudgeOracle for AnthropicOracle {
    async fn judge(&self, question: &str, context: &str) -> Result<Verdict> {
        let context = if context.trim().is_empty() {
            "(no relevant knowledge found)"
        } else {
            context
        };

        let prompt = format!(
            r#"You are verifying whether a knowledge base already answers a user question.

Knowledge base context:
{}

User question: {}

Does the context above already answer the question? Reply with exactly one word: yes or no."#,
            context, question
        );

        let response = self.call_api(&self.config.judge_model, None, &prompt).await?;
        Self::parse_verdict(&response)
    }
}

#[async_trait]
impl GeneratorOracle for AnthropicOracle {
    async fn generate(&self, question: &str, persona_prompt: &str) -> Result<String> {
        let prompt = format!(
            "A user asked the following question and was unsatisfied with the \
             previous answer. Write an improved, complete answer.\n\nQuestion: {}",
            question
        );

        let answer = self
            .call_api(&self.config.generator_model, Some(persona_prompt), &prompt)
            .await?;

        if answer.trim().is_empty() {
            return Err(IasoError::LlmApi(
                "Generator returned an empty answer".to_string(),
            ));
        }

        Ok(answer.trim().to_string())
    }
}
