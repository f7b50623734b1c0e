//! Iaso - Self-Healing Knowledge Pipeline
//!
//! A feedback-driven retrieval augmentation improvement loop for a
//! question-answering assistant: it detects poorly-answered queries,
//! verifies the knowledge base is genuinely deficient, synthesizes an
//! improved answer, and persists it for future retrieval, all without
//! human intervention.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//! - **Types**: Core data structures (Interaction, KnowledgeSnippet, etc.)
//! - **Ledger**: Durable interaction store, sole writer of processing state
//! - **Index**: Vector store of knowledge snippets (sqlite-vec)
//! - **Oracles**: Judge and generator capabilities behind narrow traits
//! - **Pipeline**: Selection, dedup, synthesis, and completion marking
//! - **Scheduler**: Recurring trigger around the schedule-agnostic pipeline
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use iaso_core::{
//!     AnthropicOracle, HealingConfig, HealingPipeline, LibsqlLedger,
//!     LocalEmbedder, OracleConfig, SqliteVecIndex,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = HealingConfig::load()?;
//!     let ledger = Arc::new(LibsqlLedger::open("iaso.db").await?);
//!     let embedder = Arc::new(LocalEmbedder::new(&config.embedding_model, None).await?);
//!     let index = Arc::new(SqliteVecIndex::new("iaso.db", embedder)?);
//!     index.init_schema().await?;
//!
//!     let oracle = Arc::new(AnthropicOracle::new(OracleConfig::from_healing_config(&config))?);
//!     let pipeline = HealingPipeline::new(ledger, index, oracle.clone(), oracle, &config);
//!
//!     let summary = pipeline.run_once().await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod ledger;
pub mod oracles;
pub mod pipeline;
pub mod scheduler;
pub mod types;

// Re-export commonly used types
pub use config::HealingConfig;
pub use embeddings::{EmbeddingService, LocalEmbedder};
pub use error::{IasoError, Result};
pub use index::{SimilarityIndex, SqliteVecIndex};
pub use ledger::{InteractionLedger, LibsqlLedger, MarkOutcome};
pub use oracles::anthropic::OracleConfig;
pub use oracles::{AnthropicOracle, GeneratorOracle, JudgeOracle, Verdict};
pub use pipeline::HealingPipeline;
pub use scheduler::HealingScheduler;
pub use types::{
    Classification, Feedback, Interaction, InteractionId, KnowledgeSnippet, RunSummary,
    ScoredSnippet, SnippetId,
};
