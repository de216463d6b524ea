//! Failure tracking and backoff primitives for outbound AI calls.

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{
    BreakerConfig, BreakerSnapshot, CircuitBreakerRegistry, CircuitState, Permit,
};
pub use retry::{RetryDecision, RetryPolicy};
