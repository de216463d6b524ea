//! Error types for AI operations.

use std::fmt;
use std::time::Duration;

use crate::types::operation::Operation;

/// Tagged error surfaced by every AI operation.
///
/// Provider adapters map their native failures onto these variants so the
/// resilience layers can decide, without knowing the provider, whether a
/// failure is worth another attempt. The type is `Clone` because a single
/// debounced invocation fans its outcome out to every attached caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Provider rate limit exceeded. Retryable; honour `retry_after` when the
    /// provider supplied one.
    RateLimited { retry_after: Option<Duration> },

    /// Account quota or billing limit reached. Never retried.
    QuotaExceeded(String),

    /// The call exceeded its timeout, either locally or at the provider.
    Timeout(String),

    /// Generic retryable network or server failure (connection reset, 502, 503).
    Transient(String),

    /// Non-retryable failure such as a malformed request or rejected credentials.
    Fatal(String),

    /// Raised locally when the operation's circuit breaker is open. No network
    /// attempt was made.
    CircuitOpen {
        operation: Operation,
        retry_after: Duration,
    },

    /// A pending debounced call was replaced by materially different input
    /// before its window elapsed.
    Superseded,

    /// The call was abandoned because the orchestrator is shutting down.
    Cancelled,

    /// The transcriber received audio that contained nothing to transcribe.
    /// Session code treats this as benign.
    NoAudioData,
}

impl Error {
    /// Whether the retry layer should make another attempt after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. } | Error::Timeout(_) | Error::Transient(_)
        )
    }

    /// Provider-supplied backoff hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after } => *retry_after,
            Error::CircuitOpen { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Map an HTTP status code returned by a provider onto the taxonomy.
    ///
    /// Intended for adapter implementations; `retry_after` is only kept for 429s.
    pub fn from_status(status: u16, message: &str, retry_after: Option<Duration>) -> Self {
        match status {
            429 => Error::RateLimited { retry_after },
            402 => Error::QuotaExceeded(message.to_string()),
            408 | 504 => Error::Timeout(message.to_string()),
            502 | 503 => Error::Transient(message.to_string()),
            _ => Error::Fatal(format!("HTTP {status}: {message}")),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::RateLimited {
                retry_after: Some(after),
            } => write!(f, "Rate limited: retry after {}ms", after.as_millis()),
            Error::RateLimited { retry_after: None } => write!(f, "Rate limited"),
            Error::QuotaExceeded(msg) => write!(f, "Quota exceeded: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::Transient(msg) => write!(f, "Transient error: {}", msg),
            Error::Fatal(msg) => write!(f, "Fatal error: {}", msg),
            Error::CircuitOpen {
                operation,
                retry_after,
            } => write!(
                f,
                "Circuit open for {}: retry after {}ms",
                operation,
                retry_after.as_millis()
            ),
            Error::Superseded => write!(f, "Superseded by newer input"),
            Error::Cancelled => write!(f, "Cancelled"),
            Error::NoAudioData => write!(f, "No audio data"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(Error::Transient("reset".into()).is_retryable());
        assert!(Error::Timeout("slow".into()).is_retryable());
        assert!(Error::RateLimited { retry_after: None }.is_retryable());

        assert!(!Error::QuotaExceeded("billing".into()).is_retryable());
        assert!(!Error::Fatal("bad request".into()).is_retryable());
        assert!(!Error::Superseded.is_retryable());
        assert!(!Error::NoAudioData.is_retryable());
        assert!(!Error::CircuitOpen {
            operation: Operation::Chat,
            retry_after: Duration::from_secs(1),
        }
        .is_retryable());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(
            Error::from_status(429, "slow down", Some(Duration::from_secs(3))),
            Error::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            }
        );
        assert!(matches!(Error::from_status(402, "", None), Error::QuotaExceeded(_)));
        assert!(matches!(Error::from_status(408, "", None), Error::Timeout(_)));
        assert!(matches!(Error::from_status(504, "", None), Error::Timeout(_)));
        assert!(matches!(Error::from_status(502, "", None), Error::Transient(_)));
        assert!(matches!(Error::from_status(503, "", None), Error::Transient(_)));
        assert!(matches!(Error::from_status(400, "", None), Error::Fatal(_)));
        assert!(matches!(Error::from_status(500, "", None), Error::Fatal(_)));
    }

    #[test]
    fn test_retry_after_hint() {
        let err = Error::RateLimited {
            retry_after: Some(Duration::from_millis(750)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_millis(750)));
        assert_eq!(Error::Transient("x".into()).retry_after(), None);
    }
}
