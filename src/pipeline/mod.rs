//! The healing pipeline orchestrator
//!
//! Composes the candidate selector, deduplication stage, synthesis stage,
//! and completion marker into one run. Control flow per candidate:
//!
//! ```text
//! SELECTED -> CLASSIFYING -> COVERED ----------------> PROCESSED
//!                         -> NEEDS_KNOWLEDGE -> SYNTHESIZING -> PROCESSED
//! ```
//!
//! Marking processed is always the last step. A crash or failure anywhere
//! before it leaves the interaction eligible, so the next scheduled run
//! re-selects and reprocesses it; at worst that duplicates a snippet,
//! never loses a healing opportunity. This mark-last ordering is the
//! pipeline's at-least-once guarantee.
//!
//! Failure containment is per candidate: one candidate's error is counted
//! and logged, and its siblings still run. Only a selection failure aborts
//! the run, which is safe because selection mutates nothing.

pub mod dedup;
pub mod selector;
pub mod synthesis;

use crate::config::HealingConfig;
use crate::error::{IasoError, Result};
use crate::index::SimilarityIndex;
use crate::ledger::InteractionLedger;
use crate::oracles::{GeneratorOracle, JudgeOracle};
use crate::types::{Classification, Interaction, RunSummary};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info};

pub use dedup::DedupStage;
pub use selector::CandidateSelector;
pub use synthesis::SynthesisStage;

/// Terminal outcome for one successfully processed candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateOutcome {
    Covered,
    Synthesized,
}

/// One-run orchestrator; schedule-agnostic
pub struct HealingPipeline {
    ledger: Arc<dyn InteractionLedger>,
    selector: CandidateSelector,
    dedup: DedupStage,
    synthesis: SynthesisStage,
    oracle_timeout: Duration,
}

impl HealingPipeline {
    pub fn new(
        ledger: Arc<dyn InteractionLedger>,
        index: Arc<dyn SimilarityIndex>,
        judge: Arc<dyn JudgeOracle>,
        generator: Arc<dyn GeneratorOracle>,
        config: &HealingConfig,
    ) -> Self {
        let selector = CandidateSelector::new(Arc::clone(&ledger), config.feedback_threshold);
        let dedup = DedupStage::new(Arc::clone(&index), judge, config.similarity_k);
        let synthesis = SynthesisStage::new(
            generator,
            index,
            config.persona_prompt.clone(),
            config.provenance_tag.clone(),
        );

        Self {
            ledger,
            selector,
            dedup,
            synthesis,
            oracle_timeout: config.oracle_timeout(),
        }
    }

    /// Execute one healing run and report its counts
    ///
    /// A selection failure propagates and aborts the run (nothing was
    /// mutated yet). Everything after selection is contained per
    /// candidate; this method only returns `Err` before the batch starts.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let batch = self.selector.select().await?;

        if batch.is_empty() {
            info!("No actionable batch; healing run ends with no side effects");
            return Ok(RunSummary::default());
        }

        let mut summary = RunSummary::default();

        for interaction in &batch {
            summary.attempted += 1;

            match self.process_candidate(interaction).await {
                Ok(CandidateOutcome::Covered) => summary.covered += 1,
                Ok(CandidateOutcome::Synthesized) => summary.synthesized += 1,
                Err(e) => {
                    summary.failed += 1;
                    // No in-run retry; the schedule interval is the retry
                    // mechanism and the candidate stays eligible.
                    error!(
                        "Candidate {} failed and remains eligible: {}",
                        interaction.id, e
                    );
                }
            }
        }

        info!("Healing run complete: {}", summary);
        Ok(summary)
    }

    /// Run the per-candidate state machine in strict sequence:
    /// classify, then synthesize if needed, then mark processed last
    async fn process_candidate(&self, interaction: &Interaction) -> Result<CandidateOutcome> {
        debug!("Candidate {} selected", interaction.id);

        let classification = self
            .bounded("classification", self.dedup.classify(interaction))
            .await?;

        let outcome = match classification {
            Classification::Covered => {
                debug!("Candidate {} covered; skipping synthesis", interaction.id);
                CandidateOutcome::Covered
            }
            Classification::NeedsKnowledge => {
                self.bounded("synthesis", self.synthesis.synthesize(interaction))
                    .await?;
                CandidateOutcome::Synthesized
            }
        };

        // Completion marker: the flag flips only after all durable work
        // for this candidate succeeded.
        self.ledger.mark_processed(interaction.id).await?;
        debug!("Candidate {} processed", interaction.id);

        Ok(outcome)
    }

    /// Bound an external stage by the configured oracle timeout; an
    /// elapsed timer is a candidate-level failure, not a run abort
    async fn bounded<T>(
        &self,
        stage: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match timeout(self.oracle_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(IasoError::Timeout(format!(
                "{} exceeded {:?}",
                stage, self.oracle_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LibsqlLedger;
    use crate::oracles::Verdict;
    use crate::types::{Feedback, KnowledgeSnippet, ScoredSnippet};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingIndex {
        queries: AtomicUsize,
        upserts: AtomicUsize,
    }

    #[async_trait]
    impl SimilarityIndex for CountingIndex {
        async fn query(&self, _text: &str, _k: usize) -> Result<Vec<ScoredSnippet>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn upsert(&self, _snippet: &KnowledgeSnippet) -> Result<()> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FixedJudge(Verdict);

    #[async_trait]
    impl crate::oracles::JudgeOracle for FixedJudge {
        async fn judge(&self, _question: &str, _context: &str) -> Result<Verdict> {
            Ok(self.0)
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl crate::oracles::GeneratorOracle for EchoGenerator {
        async fn generate(&self, question: &str, _persona_prompt: &str) -> Result<String> {
            Ok(format!("better answer to {}", question))
        }
    }

    async fn ledger_with_negative(count: usize) -> Arc<LibsqlLedger> {
        let ledger = LibsqlLedger::in_memory().await.unwrap();
        for i in 0..count {
            let id = ledger
                .record_interaction(&format!("q{}", i), &format!("a{}", i))
                .await
                .unwrap();
            ledger.record_feedback(id, Feedback::Negative).await.unwrap();
        }
        Arc::new(ledger)
    }

    fn pipeline(
        ledger: Arc<LibsqlLedger>,
        index: Arc<CountingIndex>,
        verdict: Verdict,
    ) -> HealingPipeline {
        let config = HealingConfig::default();
        HealingPipeline::new(
            ledger,
            index,
            Arc::new(FixedJudge(verdict)),
            Arc::new(EchoGenerator),
            &config,
        )
    }

    #[tokio::test]
    async fn test_below_threshold_run_has_no_side_effects() {
        let ledger = ledger_with_negative(3).await;
        let index = Arc::new(CountingIndex {
            queries: AtomicUsize::new(0),
            upserts: AtomicUsize::new(0),
        });
        let pipeline = pipeline(Arc::clone(&ledger), Arc::clone(&index), Verdict::No);

        let summary = pipeline.run_once().await.unwrap();

        assert_eq!(summary, RunSummary::default());
        assert_eq!(index.queries.load(Ordering::SeqCst), 0);
        assert_eq!(index.upserts.load(Ordering::SeqCst), 0);
        assert_eq!(ledger.count_eligible().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_covered_candidates_skip_synthesis() {
        let ledger = ledger_with_negative(5).await;
        let index = Arc::new(CountingIndex {
            queries: AtomicUsize::new(0),
            upserts: AtomicUsize::new(0),
        });
        let pipeline = pipeline(Arc::clone(&ledger), Arc::clone(&index), Verdict::Yes);

        let summary = pipeline.run_once().await.unwrap();

        assert_eq!(summary.attempted, 5);
        assert_eq!(summary.covered, 5);
        assert_eq!(summary.synthesized, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(index.upserts.load(Ordering::SeqCst), 0);
        assert_eq!(ledger.count_eligible().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_second_run_finds_nothing_left() {
        let ledger = ledger_with_negative(5).await;
        let index = Arc::new(CountingIndex {
            queries: AtomicUsize::new(0),
            upserts: AtomicUsize::new(0),
        });
        let pipeline = pipeline(Arc::clone(&ledger), Arc::clone(&index), Verdict::No);

        let first = pipeline.run_once().await.unwrap();
        assert_eq!(first.synthesized, 5);

        let second = pipeline.run_once().await.unwrap();
        assert_eq!(second, RunSummary::default());
        assert_eq!(index.upserts.load(Ordering::SeqCst), 5);
    }
}
