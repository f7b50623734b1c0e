//! Similarity index: vector store of knowledge snippets
//!
//! Queried for nearest neighbors by the deduplication stage and mutated by
//! upsert from the synthesis stage. Growth is append-only: healing never
//! edits or replaces an existing snippet.

pub mod vectors;

use crate::error::Result;
use crate::types::{KnowledgeSnippet, ScoredSnippet};
use async_trait::async_trait;

pub use vectors::SqliteVecIndex;

/// Similarity index interface consumed by the healing pipeline
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Nearest-neighbor search: top `k` snippets for the given text,
    /// ordered by descending similarity. May return fewer than `k`
    /// results, including none for an empty index.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredSnippet>>;

    /// Add a snippet as a new entry. Additive only; never overwrites.
    async fn upsert(&self, snippet: &KnowledgeSnippet) -> Result<()>;
}
