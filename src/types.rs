//! Core data types for the Iaso self-healing pipeline
//!
//! This module defines the fundamental data structures shared across the
//! pipeline: logged interactions with their feedback and processing state,
//! knowledge snippets held by the similarity index, and the summary
//! produced by one healing run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for interactions
///
/// Wraps a UUID to provide type safety and prevent mixing interaction IDs
/// with other UUID-based identifiers in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionId(pub Uuid);

impl InteractionId {
    /// Create a new random interaction ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an interaction ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for InteractionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InteractionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for knowledge snippets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnippetId(pub Uuid);

impl SnippetId {
    /// Create a new random snippet ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a snippet ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for SnippetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SnippetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User feedback on an interaction
///
/// Tri-state: an interaction starts with no feedback, and only negative
/// feedback makes it eligible for the healing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    /// No feedback given yet
    Unset,
    /// User found the answer helpful
    Positive,
    /// User found the answer unhelpful
    Negative,
}

impl Feedback {
    /// Database representation: NULL for unset, +1/-1 for ratings
    pub fn to_db(self) -> Option<i64> {
        match self {
            Feedback::Unset => None,
            Feedback::Positive => Some(1),
            Feedback::Negative => Some(-1),
        }
    }

    /// Parse the database representation; values other than +1/-1 are
    /// treated as unset rather than rejected
    pub fn from_db(value: Option<i64>) -> Self {
        match value {
            Some(v) if v > 0 => Feedback::Positive,
            Some(v) if v < 0 => Feedback::Negative,
            _ => Feedback::Unset,
        }
    }
}

impl std::fmt::Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feedback::Unset => write!(f, "unset"),
            Feedback::Positive => write!(f, "positive"),
            Feedback::Negative => write!(f, "negative"),
        }
    }
}

/// One logged question/answer exchange plus its feedback and processing state
///
/// Owned exclusively by the interaction ledger. `user_query`,
/// `bot_response` and `timestamp` are immutable once written;
/// `processed_for_training` transitions false to true at most once and is
/// only ever written by the ledger itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub user_query: String,
    pub bot_response: String,
    pub feedback: Feedback,
    pub timestamp: DateTime<Utc>,
    pub processed_for_training: bool,
}

impl Interaction {
    /// Eligibility predicate for the candidate selector: negative feedback
    /// and not yet processed. Monotone-decreasing over the interaction's
    /// lifetime because feedback is set once and the processed flag flips
    /// one way.
    pub fn is_eligible(&self) -> bool {
        self.feedback == Feedback::Negative && !self.processed_for_training
    }
}

/// A stored question/answer unit in the similarity index
///
/// Created only by the knowledge synthesis stage and never updated in
/// place; healing always appends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSnippet {
    pub id: SnippetId,
    pub question: String,
    pub answer: String,
    /// Where this snippet came from, e.g. "self-healing-feedback"
    pub provenance: String,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeSnippet {
    /// Build a new snippet with a fresh ID and the current timestamp
    pub fn new(question: String, answer: String, provenance: String) -> Self {
        Self {
            id: SnippetId::new(),
            question,
            answer,
            provenance,
            created_at: Utc::now(),
        }
    }
}

/// A snippet returned from a nearest-neighbor query with its similarity
/// score (cosine similarity: 1.0 identical, 0.0 orthogonal)
#[derive(Debug, Clone)]
pub struct ScoredSnippet {
    pub snippet: KnowledgeSnippet,
    pub similarity: f32,
}

/// Outcome of the deduplication stage for one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The knowledge base already answers this question; skip synthesis
    Covered,
    /// Genuine gap; synthesize new knowledge
    NeedsKnowledge,
}

/// Per-run counters surfaced to the scheduling/operator layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Candidates the run attempted to process
    pub attempted: usize,
    /// Candidates the judge declared already covered
    pub covered: usize,
    /// Candidates for which new knowledge was synthesized and upserted
    pub synthesized: usize,
    /// Candidates that failed at some stage and remain eligible
    pub failed: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "attempted={} covered={} synthesized={} failed={}",
            self.attempted, self.covered, self.synthesized, self.failed
        )
    }
}
