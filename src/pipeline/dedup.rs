//! Deduplication stage: is this question already answered?
//!
//! Pulls the top-k nearest snippets for the candidate's query and asks the
//! judge oracle whether they cover the question. The only side effect is
//! the read-only similarity lookup; the index is never mutated here.
//!
//! A judge answer outside the strict yes/no contract fails open to
//! `NeedsKnowledge`; a protocol violation is never coerced to `Covered`.

use crate::error::{IasoError, Result};
use crate::index::SimilarityIndex;
use crate::oracles::{JudgeOracle, Verdict};
use crate::types::{Classification, Interaction, ScoredSnippet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Classifies candidates as covered or needing new knowledge
pub struct DedupStage {
    index: Arc<dyn SimilarityIndex>,
    judge: Arc<dyn JudgeOracle>,
    similarity_k: usize,
}

impl DedupStage {
    pub fn new(
        index: Arc<dyn SimilarityIndex>,
        judge: Arc<dyn JudgeOracle>,
        similarity_k: usize,
    ) -> Self {
        Self {
            index,
            judge,
            similarity_k,
        }
    }

    /// Classify one candidate interaction
    pub async fn classify(&self, interaction: &Interaction) -> Result<Classification> {
        let neighbors = self
            .index
            .query(&interaction.user_query, self.similarity_k)
            .await?;

        debug!(
            "Dedup check for {}: {} neighbors retrieved",
            interaction.id,
            neighbors.len()
        );

        let context = Self::build_context(&neighbors);

        match self.judge.judge(&interaction.user_query, &context).await {
            Ok(Verdict::Yes) => Ok(Classification::Covered),
            Ok(Verdict::No) => Ok(Classification::NeedsKnowledge),
            Err(IasoError::ProtocolViolation(msg)) => {
                // Anomaly: the judge broke its output contract. Never
                // coerce this to Covered.
                warn!(
                    "Judge protocol violation for {}: {}; treating as needs-knowledge",
                    interaction.id, msg
                );
                Ok(Classification::NeedsKnowledge)
            }
            Err(e) => Err(e),
        }
    }

    /// Concatenate retrieved snippets into the judge's context block
    fn build_context(neighbors: &[ScoredSnippet]) -> String {
        neighbors
            .iter()
            .map(|scored| {
                format!(
                    "Q: {}\nA: {}",
                    scored.snippet.question, scored.snippet.answer
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
