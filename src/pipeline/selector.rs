//! Candidate selector: eligibility query plus the volume threshold gate
//!
//! Small batches are noise. A run only proceeds when at least
//! `feedback_threshold` interactions are eligible; below that the selector
//! returns an empty batch and the run terminates with no side effects.

use crate::error::Result;
use crate::ledger::InteractionLedger;
use crate::types::Interaction;
use std::sync::Arc;
use tracing::{debug, info};

/// Selects the batch of interactions one healing run will process
pub struct CandidateSelector {
    ledger: Arc<dyn InteractionLedger>,
    min_count: usize,
}

impl CandidateSelector {
    pub fn new(ledger: Arc<dyn InteractionLedger>, min_count: usize) -> Self {
        Self { ledger, min_count }
    }

    /// All eligible interactions, or an empty batch when the eligible
    /// count is below the volume threshold. Ordering comes from the ledger
    /// and is deterministic for an unchanged ledger.
    pub async fn select(&self) -> Result<Vec<Interaction>> {
        let eligible = self.ledger.list_eligible().await?;

        if eligible.len() < self.min_count {
            debug!(
                "Only {} eligible interactions (threshold {}), skipping run",
                eligible.len(),
                self.min_count
            );
            return Ok(Vec::new());
        }

        info!(
            "Selected {} eligible interactions for healing",
            eligible.len()
        );
        Ok(eligible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LibsqlLedger;
    use crate::types::Feedback;

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

    #[tokio::test]
    async fn test_below_threshold_returns_empty() {
        let ledger = ledger_with_negative(4).await;
        let selector = CandidateSelector::new(ledger, 5);
        assert!(selector.select().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_at_threshold_returns_all() {
        let ledger = ledger_with_negative(5).await;
        let selector = CandidateSelector::new(ledger, 5);
        assert_eq!(selector.select().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_above_threshold_returns_all() {
        let ledger = ledger_with_negative(8).await;
        let selector = CandidateSelector::new(ledger, 5);
        assert_eq!(selector.select().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_zero_threshold_with_empty_ledger() {
        let ledger = ledger_with_negative(0).await;
        let selector = CandidateSelector::new(ledger, 0);
        assert!(selector.select().await.unwrap().is_empty());
    }
}
