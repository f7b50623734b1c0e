//! sqlite-vec backed similarity index
//!
//! Dual storage approach: a plain snippet table for text and provenance,
//! plus a vec0 virtual table for embeddings, both in the same SQLite file.
//! Connections come from a deadpool-sqlite pool with the sqlite-vec
//! extension registered as an auto-extension so every pooled connection
//! can run KNN queries.
//!
//! The index embeds text itself through an injected `EmbeddingService`, so
//! callers stay at the text level.

use crate::embeddings::EmbeddingService;
use crate::error::{IasoError, Result};
use crate::index::SimilarityIndex;
use crate::types::{KnowledgeSnippet, ScoredSnippet, SnippetId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_sqlite::{Config, Pool, Runtime};
use rusqlite::Result as SqliteResult;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Similarity index over sqlite-vec with pooled connections
pub struct SqliteVecIndex {
    pool: Pool,
    embedder: Arc<dyn EmbeddingService>,
    dimensions: usize,
}

impl SqliteVecIndex {
    /// Create a new index at the given path
    ///
    /// The embedder's dimensionality fixes the vec0 column width; opening
    /// an existing index with a different model is a configuration error
    /// surfaced by the first query.
    pub fn new<P: AsRef<Path>>(db_path: P, embedder: Arc<dyn EmbeddingService>) -> Result<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();
        let dimensions = embedder.dimensions();

        info!(
            "Creating similarity index pool at: {} (dimensions: {})",
            path_str, dimensions
        );

        // Register sqlite-vec as an auto-extension so it's available for
        // all connections in the pool
        unsafe {
            use rusqlite::ffi::sqlite3_auto_extension;

            #[allow(clippy::missing_transmute_annotations)]
            sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }

        let config = Config::new(path_str);
        let pool = config
            .create_pool(Runtime::Tokio1)
            .map_err(|e| IasoError::Database(format!("Failed to create connection pool: {}", e)))?;

        Ok(Self {
            pool,
            embedder,
            dimensions,
        })
    }

    /// Create the snippet and vector tables
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<()> {
        let vec_sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS snippet_vectors USING vec0(
                snippet_id TEXT PRIMARY KEY,
                embedding FLOAT[{}] distance_metric=cosine
            )",
            self.dimensions
        );

        let conn = self.pool.get().await.map_err(|e| {
            IasoError::Database(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.interact(move |conn| -> Result<()> {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS knowledge_snippets (
                    id TEXT PRIMARY KEY,
                    question TEXT NOT NULL,
                    answer TEXT NOT NULL,
                    provenance TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                )",
                [],
            )
            .map_err(|e| IasoError::Database(format!("Failed to create snippet table: {}", e)))?;

            conn.execute(&vec_sql, []).map_err(|e| {
                IasoError::Database(format!("Failed to create vec0 table: {}", e))
            })?;

            Ok(())
        })
        .await
        .map_err(|e| IasoError::Database(format!("Pool interaction failed: {}", e)))??;

        info!("Similarity index schema ready");
        Ok(())
    }

    /// Count stored snippets
    pub async fn count_snippets(&self) -> Result<usize> {
        let conn = self.pool.get().await.map_err(|e| {
            IasoError::Database(format!("Failed to get connection from pool: {}", e))
        })?;

        let count = conn
            .interact(|conn| -> Result<usize> {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM knowledge_snippets", [], |row| {
                        row.get(0)
                    })
                    .map_err(|e| {
                        IasoError::Database(format!("Failed to count snippets: {}", e))
                    })?;
                Ok(count as usize)
            })
            .await
            .map_err(|e| IasoError::Database(format!("Pool interaction failed: {}", e)))??;

        Ok(count)
    }

    fn row_to_snippet(row: &rusqlite::Row<'_>) -> SqliteResult<KnowledgeSnippet> {
        let id_str: String = row.get(0)?;
        let question: String = row.get(1)?;
        let answer: String = row.get(2)?;
        let provenance: String = row.get(3)?;
        let created_secs: i64 = row.get(4)?;

        let id = SnippetId::from_string(&id_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let created_at = DateTime::<Utc>::from_timestamp(created_secs, 0).unwrap_or_else(Utc::now);

        Ok(KnowledgeSnippet {
            id,
            question,
            answer,
            provenance,
            created_at,
        })
    }
}

#[async_trait]
impl SimilarityIndex for SqliteVecIndex {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredSnippet>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        debug!("Similarity query (k = {})", k);

        let query_embedding = self.embedder.embed(text).await?;
        let query_json = serde_json::to_string(&query_embedding)?;

        let conn = self.pool.get().await.map_err(|e| {
            IasoError::Database(format!("Failed to get connection from pool: {}", e))
        })?;

        let results = conn
            .interact(move |conn| -> Result<Vec<ScoredSnippet>> {
                let mut stmt = conn
                    .prepare(
                        "SELECT snippet_id, distance
                         FROM snippet_vectors
                         WHERE embedding MATCH vec_f32(?)
                         ORDER BY distance
                         LIMIT ?",
                    )
                    .map_err(|e| IasoError::Database(format!("Failed to prepare search: {}", e)))?;

                let neighbors: SqliteResult<Vec<(String, f32)>> = stmt
                    .query_map(rusqlite::params![query_json, k as i64], |row| {
                        let id_str: String = row.get(0)?;
                        let distance: f32 = row.get(1)?;
                        // vec0 column uses the cosine metric, so
                        // distance = 1 - similarity
                        Ok((id_str, 1.0 - distance))
                    })
                    .and_then(|mapped| mapped.collect::<SqliteResult<Vec<_>>>());

                let neighbors = neighbors.map_err(|e| {
                    IasoError::Database(format!("Failed to execute vector search: {}", e))
                })?;

                let mut meta_stmt = conn
                    .prepare(
                        "SELECT id, question, answer, provenance, created_at
                         FROM knowledge_snippets WHERE id = ?",
                    )
                    .map_err(|e| {
                        IasoError::Database(format!("Failed to prepare metadata fetch: {}", e))
                    })?;

                let mut results = Vec::with_capacity(neighbors.len());
                for (id_str, similarity) in neighbors {
                    let snippet = meta_stmt
                        .query_row(rusqlite::params![id_str], Self::row_to_snippet)
                        .map_err(|e| {
                            IasoError::Database(format!("Failed to fetch snippet metadata: {}", e))
                        })?;
                    results.push(ScoredSnippet {
                        snippet,
                        similarity,
                    });
                }

                Ok(results)
            })
            .await
            .map_err(|e| IasoError::Database(format!("Pool interaction failed: {}", e)))??;

        debug!("Similarity query returned {} results", results.len());
        Ok(results)
    }

    async fn upsert(&self, snippet: &KnowledgeSnippet) -> Result<()> {
        debug!("Upserting snippet {}", snippet.id);

        let embedding = self.embedder.embed(&snippet.question).await?;
        if embedding.len() != self.dimensions {
            return Err(IasoError::Embedding(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                embedding.len()
            )));
        }
        let embedding_json = serde_json::to_string(&embedding)?;

        let id = snippet.id.to_string();
        let question = snippet.question.clone();
        let answer = snippet.answer.clone();
        let provenance = snippet.provenance.clone();
        let created_at = snippet.created_at.timestamp();

        let conn = self.pool.get().await.map_err(|e| {
            IasoError::Database(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.interact(move |conn| -> Result<()> {
            let tx = conn
                .transaction()
                .map_err(|e| IasoError::Database(format!("Failed to begin transaction: {}", e)))?;

            // Snippet IDs are freshly minted; both inserts are plain appends
            tx.execute(
                "INSERT INTO knowledge_snippets (id, question, answer, provenance, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                rusqlite::params![id, question, answer, provenance, created_at],
            )
            .map_err(|e| IasoError::Database(format!("Failed to insert snippet: {}", e)))?;

            tx.execute(
                "INSERT INTO snippet_vectors (snippet_id, embedding)
                 VALUES (?, vec_f32(?))",
                rusqlite::params![id, embedding_json],
            )
            .map_err(|e| IasoError::Database(format!("Failed to insert vector: {}", e)))?;

            tx.commit()
                .map_err(|e| IasoError::Database(format!("Failed to commit upsert: {}", e)))?;

            Ok(())
        })
        .await
        .map_err(|e| IasoError::Database(format!("Pool interaction failed: {}", e)))??;

        debug!("Snippet {} stored", snippet.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Deterministic embedder: maps known phrases to fixed unit vectors so
    /// tests never touch a real model
    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingService for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let v = match text {
                t if t.contains("password") => vec![1.0, 0.0, 0.0],
                t if t.contains("billing") => vec![0.0, 1.0, 0.0],
                _ => vec![0.0, 0.0, 1.0],
            };
            Ok(v)
        }

        fn dimensions(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    async fn create_test_index() -> (SqliteVecIndex, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let index = SqliteVecIndex::new(db_path, Arc::new(StubEmbedder)).unwrap();
        index.init_schema().await.unwrap();
        (index, temp_dir)
    }

    fn snippet(question: &str, answer: &str) -> KnowledgeSnippet {
        KnowledgeSnippet::new(
            question.to_string(),
            answer.to_string(),
            "self-healing-feedback".to_string(),
        )
    }

    #[tokio::test]
    async fn test_empty_index_returns_no_neighbors() {
        let (index, _temp) = create_test_index().await;
        let results = index.query("reset my password", 3).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_and_query() {
        let (index, _temp) = create_test_index().await;

        let pw = snippet("How do I reset my password?", "Use the account page.");
        let billing = snippet("Where is my billing history?", "Under settings.");
        index.upsert(&pw).await.unwrap();
        index.upsert(&billing).await.unwrap();

        let results = index.query("forgot password help", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].snippet.id, pw.id);
        assert!(results[0].similarity > 0.99);
        assert!(results[0].similarity > results[1].similarity);
        // Orthogonal unit vectors score zero under the cosine metric
        assert!(results[1].similarity.abs() < 0.01);
    }

    #[tokio::test]
    async fn test_query_returns_at_most_k() {
        let (index, _temp) = create_test_index().await;

        for i in 0..5 {
            index
                .upsert(&snippet(&format!("password question {}", i), "answer"))
                .await
                .unwrap();
        }

        let results = index.query("password", 3).await.unwrap();
        assert_eq!(results.len(), 3);

        let results = index.query("password", 0).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_is_append_only() {
        let (index, _temp) = create_test_index().await;

        // Same question text twice still yields two distinct entries
        index
            .upsert(&snippet("password question", "first answer"))
            .await
            .unwrap();
        index
            .upsert(&snippet("password question", "second answer"))
            .await
            .unwrap();

        assert_eq!(index.count_snippets().await.unwrap(), 2);
    }
}
