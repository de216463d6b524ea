//! Meeting AI abstraction and orchestration layer.
//!
//! This crate provides:
//! - Provider traits for raw text generation and speech-to-text
//! - A tagged error taxonomy shared by every provider adapter
//! - Resilience primitives: TTL cache, per-operation circuit breakers,
//!   exponential backoff, and near-duplicate debouncing
//! - [`Orchestrator`], which composes those primitives around the raw providers
//!   and exposes the stable operation set (analyze, coach, chat, methodology
//!   insights, follow-up questions, summary, transcript cleanup, transcribe)
//!
//! The design is provider-agnostic; adapters for a specific vendor implement
//! [`TextGenerator`] or [`Transcriber`] and map their failures onto [`Error`].

pub mod cache;
pub mod debounce;
pub mod error;
pub mod layer;
pub mod orchestrator;
pub mod resilience;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export commonly used types
pub use error::Error;
pub use orchestrator::{CacheStrategy, OperationPolicy, Orchestrator, OrchestratorConfig};
pub use traits::generation::Provider as TextGenerator;
pub use traits::transcription::Provider as Transcriber;
pub use types::operation::{Completion, Operation, OperationRequest, Overrides, Tuning};
pub use types::prompt::Prompt;
