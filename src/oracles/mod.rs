//! Oracle capability interfaces
//!
//! The judge and generator are external, potentially nondeterministic
//! capabilities. They sit behind narrow traits so the decision logic in
//! the pipeline stays deterministic and unit-testable with stub oracles
//! returning fixed values.

pub mod anthropic;

use crate::error::Result;
use async_trait::async_trait;

pub use anthropic::AnthropicOracle;

/// Strict binary verdict from the judge oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Yes,
    No,
}

/// Fast classifier-style capability: "does this context already answer
/// this question?"
///
/// Implementations must return `IasoError::ProtocolViolation` for any
/// model output that is not a strict yes/no; the caller decides what to do
/// with the violation.
#[async_trait]
pub trait JudgeOracle: Send + Sync {
    async fn judge(&self, question: &str, context: &str) -> Result<Verdict>;
}

/// Slower text-generation capability: produce an improved answer grounded
/// in a persona/brand preamble
#[async_trait]
pub trait GeneratorOracle: Send + Sync {
    async fn generate(&self, question: &str, persona_prompt: &str) -> Result<String>;
}
