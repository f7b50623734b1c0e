//! Knowledge synthesis stage: generate an improved answer and persist it
//!
//! Invoked only for candidates the dedup stage classified as genuine gaps.
//! The generator writes a better answer grounded in the configured persona
//! preamble; the result becomes a provenance-tagged snippet appended to
//! the similarity index. This is the most expensive and failure-prone step
//! in the pipeline, and its failure must leave the candidate's processed
//! flag untouched.

use crate::error::Result;
use crate::index::SimilarityIndex;
use crate::oracles::GeneratorOracle;
use crate::types::{Interaction, KnowledgeSnippet};
use std::sync::Arc;
use tracing::{debug, info};

/// Produces and persists new knowledge snippets
pub struct SynthesisStage {
    generator: Arc<dyn GeneratorOracle>,
    index: Arc<dyn SimilarityIndex>,
    persona_prompt: String,
    provenance_tag: String,
}

impl SynthesisStage {
    pub fn new(
        generator: Arc<dyn GeneratorOracle>,
        index: Arc<dyn SimilarityIndex>,
        persona_prompt: String,
        provenance_tag: String,
    ) -> Self {
        Self {
            generator,
            index,
            persona_prompt,
            provenance_tag,
        }
    }

    /// Generate an improved answer for the interaction's query and upsert
    /// it as a new snippet. Returns the stored snippet.
    pub async fn synthesize(&self, interaction: &Interaction) -> Result<KnowledgeSnippet> {
        debug!("Synthesizing knowledge for {}", interaction.id);

        let improved_answer = self
            .generator
            .generate(&interaction.user_query, &self.persona_prompt)
            .await?;

        let snippet = KnowledgeSnippet::new(
            interaction.user_query.clone(),
            improved_answer,
            self.provenance_tag.clone(),
        );

        self.index.upsert(&snippet).await?;

        info!(
            "Stored snippet {} for interaction {}",
            snippet.id, interaction.id
        );
        Ok(snippet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IasoError;
    use crate::types::{Feedback, InteractionId, ScoredSnippet};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    struct RecordingIndex {
        upserted: Mutex<Vec<KnowledgeSnippet>>,
        fail_upsert: bool,
    }

    #[async_trait]
    impl SimilarityIndex for RecordingIndex {
        async fn query(&self, _text: &str, _k: usize) -> Result<Vec<ScoredSnippet>> {
            Ok(Vec::new())
        }

        async fn upsert(&self, snippet: &KnowledgeSnippet) -> Result<()> {
            if self.fail_upsert {
                return Err(IasoError::Database("index unavailable".to_string()));
            }
            self.upserted.lock().unwrap().push(snippet.clone());
            Ok(())
        }
    }

    struct StubGenerator {
        fail: bool,
    }

    #[async_trait]
    impl GeneratorOracle for StubGenerator {
        async fn generate(&self, question: &str, persona_prompt: &str) -> Result<String> {
            if self.fail {
                return Err(IasoError::LlmApi("generation failed".to_string()));
            }
            Ok(format!("[{}] improved answer to: {}", persona_prompt, question))
        }
    }

    fn interaction() -> Interaction {
        Interaction {
            id: InteractionId::new(),
            user_query: "how do I export my data?".to_string(),
            bot_response: "unclear".to_string(),
            feedback: Feedback::Negative,
            timestamp: Utc::now(),
            processed_for_training: false,
        }
    }

    #[tokio::test]
    async fn test_synthesize_stores_tagged_snippet() {
        let index = Arc::new(RecordingIndex {
            upserted: Mutex::new(Vec::new()),
            fail_upsert: false,
        });
        let stage = SynthesisStage::new(
            Arc::new(StubGenerator { fail: false }),
            index.clone(),
            "support persona".to_string(),
            "self-healing-feedback".to_string(),
        );

        let snippet = stage.synthesize(&interaction()).await.unwrap();

        assert_eq!(snippet.question, "how do I export my data?");
        assert!(snippet.answer.contains("support persona"));
        assert_eq!(snippet.provenance, "self-healing-feedback");

        let upserted = index.upserted.lock().unwrap();
        assert_eq!(upserted.len(), 1);
        assert_eq!(upserted[0], snippet);
    }

    #[tokio::test]
    async fn test_generator_failure_stores_nothing() {
        let index = Arc::new(RecordingIndex {
            upserted: Mutex::new(Vec::new()),
            fail_upsert: false,
        });
        let stage = SynthesisStage::new(
            Arc::new(StubGenerator { fail: true }),
            index.clone(),
            "persona".to_string(),
            "tag".to_string(),
        );

        assert!(stage.synthesize(&interaction()).await.is_err());
        assert!(index.upserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_failure_propagates() {
        let index = Arc::new(RecordingIndex {
            upserted: Mutex::new(Vec::new()),
            fail_upsert: true,
        });
        let stage = SynthesisStage::new(
            Arc::new(StubGenerator { fail: false }),
            index,
            "persona".to_string(),
            "tag".to_string(),
        );

        assert!(stage.synthesize(&interaction()).await.is_err());
    }
}
