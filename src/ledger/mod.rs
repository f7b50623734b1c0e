//! Interaction ledger: durable record store for question/answer exchanges
//!
//! The ledger is the single source of truth for interaction state. It is
//! the sole writer of the `processed_for_training` flag; every other
//! component requests a mark-processed operation instead of mutating the
//! record directly.

pub mod libsql;

use crate::error::Result;
use crate::types::{Feedback, Interaction, InteractionId};
use async_trait::async_trait;

pub use self::libsql::LibsqlLedger;

/// Result of a mark-processed request
///
/// Re-marking an already-processed interaction is a no-op by contract, not
/// an error, so overlapping runs can race on the same candidate safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The flag transitioned false to true
    Marked,
    /// The flag was already set; nothing changed
    AlreadyProcessed,
}

/// Ledger interface consumed by the healing pipeline
#[async_trait]
pub trait InteractionLedger: Send + Sync {
    /// Record a new question/answer exchange with no feedback yet
    async fn record_interaction(
        &self,
        user_query: &str,
        bot_response: &str,
    ) -> Result<InteractionId>;

    /// Set or change the feedback rating for an interaction. Never touches
    /// the processed flag, so re-rating an already-processed interaction
    /// does not re-enter eligibility.
    async fn record_feedback(&self, id: InteractionId, feedback: Feedback) -> Result<()>;

    /// Fetch a single interaction by ID
    async fn get_interaction(&self, id: InteractionId) -> Result<Interaction>;

    /// All eligible interactions (negative feedback, not yet processed) in
    /// deterministic order: timestamp ascending, ID as tiebreak
    async fn list_eligible(&self) -> Result<Vec<Interaction>>;

    /// One-way, idempotent flag flip; serialized per interaction at the
    /// store boundary via a conditional update
    async fn mark_processed(&self, id: InteractionId) -> Result<MarkOutcome>;

    /// Count of currently eligible interactions
    async fn count_eligible(&self) -> Result<usize>;

    /// Count of interactions already processed for training
    async fn count_processed(&self) -> Result<usize>;
}
