//! libsql-backed interaction ledger
//!
//! Schema is initialized inline with `IF NOT EXISTS`, safe to call on
//! every startup. The one-way `processed_for_training` invariant is
//! enforced at the store boundary: `mark_processed` is a conditional
//! `UPDATE ... AND processed_for_training = 0`, so concurrent runs racing
//! on the same interaction cannot revert the flag and the loser observes a
//! clean no-op.

use super::{InteractionLedger, MarkOutcome};
use crate::error::{IasoError, Result};
use crate::types::{Feedback, Interaction, InteractionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;
use tracing::{debug, info};

/// libsql implementation of the interaction ledger
pub struct LibsqlLedger {
    conn: libsql::Connection,
}

impl LibsqlLedger {
    /// Open (or create) a ledger database at the given path
    pub async fn open(db_path: &str) -> Result<Self> {
        info!("Opening interaction ledger at: {}", db_path);

        let db = libsql::Builder::new_local(db_path)
            .build()
            .await
            .map_err(|e| IasoError::Database(format!("Failed to open ledger: {}", e)))?;

        let conn = db
            .connect()
            .map_err(|e| IasoError::Database(format!("Failed to get connection: {}", e)))?;

        let ledger = Self { conn };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    /// Open an in-memory ledger (tests and throwaway runs)
    pub async fn in_memory() -> Result<Self> {
        Self::open(":memory:").await
    }

    /// Create the interactions table if it does not exist yet
    async fn init_schema(&self) -> Result<()> {
        self.conn
            .execute(
                r#"
                CREATE TABLE IF NOT EXISTS interactions (
                    id TEXT PRIMARY KEY,
                    user_query TEXT NOT NULL,
                    bot_response TEXT NOT NULL,
                    feedback INTEGER,
                    timestamp INTEGER NOT NULL,
                    processed_for_training INTEGER NOT NULL DEFAULT 0
                )
                "#,
                (),
            )
            .await
            .map_err(|e| IasoError::Database(format!("Failed to create schema: {}", e)))?;

        self.conn
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_interactions_eligibility
                 ON interactions (feedback, processed_for_training, timestamp)",
                (),
            )
            .await
            .map_err(|e| IasoError::Database(format!("Failed to create index: {}", e)))?;

        Ok(())
    }

    fn row_to_interaction(row: &libsql::Row) -> Result<Interaction> {
        let id_str: String = row
            .get(0)
            .map_err(|e| IasoError::Database(e.to_string()))?;
        let user_query: String = row
            .get(1)
            .map_err(|e| IasoError::Database(e.to_string()))?;
        let bot_response: String = row
            .get(2)
            .map_err(|e| IasoError::Database(e.to_string()))?;
        let feedback: Option<i64> = row
            .get(3)
            .map_err(|e| IasoError::Database(e.to_string()))?;
        let timestamp_secs: i64 = row
            .get(4)
            .map_err(|e| IasoError::Database(e.to_string()))?;
        let processed: i64 = row
            .get(5)
            .map_err(|e| IasoError::Database(e.to_string()))?;

        let timestamp = DateTime::<Utc>::from_timestamp(timestamp_secs, 0)
            .ok_or_else(|| IasoError::Database(format!("Bad timestamp: {}", timestamp_secs)))?;

        Ok(Interaction {
            id: InteractionId::from_string(&id_str)?,
            user_query,
            bot_response,
            feedback: Feedback::from_db(feedback),
            timestamp,
            processed_for_training: processed != 0,
        })
    }

    async fn count_where(&self, predicate: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM interactions WHERE {}", predicate);
        let mut rows = self
            .conn
            .query(&sql, ())
            .await
            .map_err(|e| IasoError::Database(format!("Count query failed: {}", e)))?;

        let row = rows
            .next()
            .await
            .map_err(|e| IasoError::Database(e.to_string()))?
            .ok_or_else(|| IasoError::Database("Count query returned no rows".to_string()))?;

        let count: i64 = row.get(0).map_err(|e| IasoError::Database(e.to_string()))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl InteractionLedger for LibsqlLedger {
    async fn record_interaction(
        &self,
        user_query: &str,
        bot_response: &str,
    ) -> Result<InteractionId> {
        let id = InteractionId::new();
        let now = Utc::now().timestamp();

        debug!("Recording interaction {}", id);

        self.conn
            .execute(
                "INSERT INTO interactions (id, user_query, bot_response, feedback, timestamp, processed_for_training)
                 VALUES (?, ?, ?, NULL, ?, 0)",
                params![id.to_string(), user_query, bot_response, now],
            )
            .await
            .map_err(|e| IasoError::Database(format!("Failed to record interaction: {}", e)))?;

        Ok(id)
    }

    async fn record_feedback(&self, id: InteractionId, feedback: Feedback) -> Result<()> {
        debug!("Recording {} feedback for {}", feedback, id);

        let affected = self
            .conn
            .execute(
                "UPDATE interactions SET feedback = ? WHERE id = ?",
                params![feedback.to_db(), id.to_string()],
            )
            .await
            .map_err(|e| IasoError::Database(format!("Failed to record feedback: {}", e)))?;

        if affected == 0 {
            return Err(IasoError::InteractionNotFound(id.to_string()));
        }

        Ok(())
    }

    async fn get_interaction(&self, id: InteractionId) -> Result<Interaction> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_query, bot_response, feedback, timestamp, processed_for_training
                 FROM interactions WHERE id = ?",
                params![id.to_string()],
            )
            .await
            .map_err(|e| IasoError::Database(format!("Failed to fetch interaction: {}", e)))?;

        let row = rows
            .next()
            .await
            .map_err(|e| IasoError::Database(e.to_string()))?
            .ok_or_else(|| IasoError::InteractionNotFound(id.to_string()))?;

        Self::row_to_interaction(&row)
    }

    async fn list_eligible(&self) -> Result<Vec<Interaction>> {
        // Deterministic order so re-running on an unchanged ledger yields
        // the same batch: timestamp ascending, id as tiebreak.
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_query, bot_response, feedback, timestamp, processed_for_training
                 FROM interactions
                 WHERE feedback = -1 AND processed_for_training = 0
                 ORDER BY timestamp ASC, id ASC",
                (),
            )
            .await
            .map_err(|e| IasoError::Database(format!("Eligibility query failed: {}", e)))?;

        let mut eligible = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| IasoError::Database(e.to_string()))?
        {
            eligible.push(Self::row_to_interaction(&row)?);
        }

        Ok(eligible)
    }

    async fn mark_processed(&self, id: InteractionId) -> Result<MarkOutcome> {
        // Conditional update: only flips 0 -> 1. Zero rows affected means
        // either already processed or unknown id; disambiguate below.
        let affected = self
            .conn
            .execute(
                "UPDATE interactions SET processed_for_training = 1
                 WHERE id = ? AND processed_for_training = 0",
                params![id.to_string()],
            )
            .await
            .map_err(|e| IasoError::Database(format!("Failed to mark processed: {}", e)))?;

        if affected > 0 {
            debug!("Marked interaction {} as processed", id);
            return Ok(MarkOutcome::Marked);
        }

        let interaction = self.get_interaction(id).await?;
        if interaction.processed_for_training {
            debug!("Interaction {} was already processed", id);
            Ok(MarkOutcome::AlreadyProcessed)
        } else {
            Err(IasoError::Database(format!(
                "Mark-processed update affected no rows for {}",
                id
            )))
        }
    }

    async fn count_eligible(&self) -> Result<usize> {
        self.count_where("feedback = -1 AND processed_for_training = 0")
            .await
    }

    async fn count_processed(&self) -> Result<usize> {
        self.count_where("processed_for_training = 1").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ledger_with_negative(count: usize) -> (LibsqlLedger, Vec<InteractionId>) {
        let ledger = LibsqlLedger::in_memory().await.unwrap();
        let mut ids = Vec::new();
        for i in 0..count {
            let id = ledger
                .record_interaction(&format!("question {}", i), &format!("answer {}", i))
                .await
                .unwrap();
            ledger.record_feedback(id, Feedback::Negative).await.unwrap();
            ids.push(id);
        }
        (ledger, ids)
    }

    #[tokio::test]
    async fn test_record_and_get() {
        let ledger = LibsqlLedger::in_memory().await.unwrap();
        let id = ledger
            .record_interaction("how do I export data?", "You can't.")
            .await
            .unwrap();

        let interaction = ledger.get_interaction(id).await.unwrap();
        assert_eq!(interaction.user_query, "how do I export data?");
        assert_eq!(interaction.feedback, Feedback::Unset);
        assert!(!interaction.processed_for_training);
    }

    #[tokio::test]
    async fn test_feedback_unknown_id() {
        let ledger = LibsqlLedger::in_memory().await.unwrap();
        let result = ledger
            .record_feedback(InteractionId::new(), Feedback::Negative)
            .await;
        assert!(matches!(result, Err(IasoError::InteractionNotFound(_))));
    }

    #[tokio::test]
    async fn test_only_negative_unprocessed_is_eligible() {
        let ledger = LibsqlLedger::in_memory().await.unwrap();

        let unrated = ledger.record_interaction("q1", "a1").await.unwrap();
        let positive = ledger.record_interaction("q2", "a2").await.unwrap();
        let negative = ledger.record_interaction("q3", "a3").await.unwrap();

        ledger
            .record_feedback(positive, Feedback::Positive)
            .await
            .unwrap();
        ledger
            .record_feedback(negative, Feedback::Negative)
            .await
            .unwrap();

        let eligible = ledger.list_eligible().await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, negative);
        assert_ne!(eligible[0].id, unrated);

        assert_eq!(ledger.count_eligible().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_processed_is_idempotent() {
        let (ledger, ids) = ledger_with_negative(1).await;

        let first = ledger.mark_processed(ids[0]).await.unwrap();
        assert_eq!(first, MarkOutcome::Marked);

        let second = ledger.mark_processed(ids[0]).await.unwrap();
        assert_eq!(second, MarkOutcome::AlreadyProcessed);

        let interaction = ledger.get_interaction(ids[0]).await.unwrap();
        assert!(interaction.processed_for_training);
    }

    #[tokio::test]
    async fn test_mark_processed_unknown_id() {
        let ledger = LibsqlLedger::in_memory().await.unwrap();
        let result = ledger.mark_processed(InteractionId::new()).await;
        assert!(matches!(result, Err(IasoError::InteractionNotFound(_))));
    }

    #[tokio::test]
    async fn test_processed_leaves_eligibility_forever() {
        let (ledger, ids) = ledger_with_negative(3).await;

        ledger.mark_processed(ids[1]).await.unwrap();

        let eligible = ledger.list_eligible().await.unwrap();
        assert_eq!(eligible.len(), 2);
        assert!(eligible.iter().all(|i| i.id != ids[1]));

        // Re-rating the processed interaction does not re-enter eligibility
        ledger
            .record_feedback(ids[1], Feedback::Negative)
            .await
            .unwrap();
        assert_eq!(ledger.list_eligible().await.unwrap().len(), 2);
        assert_eq!(ledger.count_processed().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_eligible_is_deterministic() {
        let (ledger, _ids) = ledger_with_negative(5).await;

        let first = ledger.list_eligible().await.unwrap();
        let second = ledger.list_eligible().await.unwrap();

        let first_ids: Vec<_> = first.iter().map(|i| i.id).collect();
        let second_ids: Vec<_> = second.iter().map(|i| i.id).collect();
        assert_eq!(first_ids, second_ids);

        // No duplicates within a batch
        let mut deduped = first_ids.clone();
        deduped.sort_by_key(|id| id.0);
        deduped.dedup();
        assert_eq!(deduped.len(), first_ids.len());
    }
}
