//! Text generation provider trait.

use crate::types::operation::{Completion, Operation, Tuning};
use crate::types::prompt::Prompt;
use crate::Error;
use async_trait::async_trait;

/// Abstraction for the raw LLM client behind every text operation.
///
/// Implementations make exactly one network attempt per call and map failures onto
/// [`Error`] variants; retries, caching and debouncing are layered on top by the
/// orchestrator, so adapters must not retry on their own.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate a completion for `prompt` on behalf of `operation`.
    ///
    /// `operation` lets adapters choose a model or response format per operation
    /// (e.g. JSON mode for analysis, plain text for chat).
    async fn generate(
        &self,
        operation: Operation,
        prompt: Prompt,
        tuning: Tuning,
    ) -> std::result::Result<Completion, Error>;

    /// Return unique identifier for this provider (e.g., "openai", "anthropic").
    fn provider_id(&self) -> &str;
}
