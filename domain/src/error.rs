//! Error types for the `domain` layer.
use meeting_ai::Error as AiError;
use std::error::Error as StdError;
use std::fmt;

/// Top-level domain error type.
/// Errors in the Domain layer are modeled as a tree structure
/// with `domain::error::Error` as the root type holding a tree of `error_kind`
/// enums that represent the kinds of errors that can occur in the domain layer or
/// in lower layers. The `source` field holds the original error that caused
/// the domain error, so callers can inspect an AI or I/O failure without `domain`
/// leaking those types through its own kinds.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: DomainErrorKind,
}

/// Enum representing the major categories of errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum DomainErrorKind {
    Internal(InternalErrorKind),
    External(ExternalErrorKind),
}

/// Enum representing the various kinds of internal errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum InternalErrorKind {
    Session(SessionErrorKind),
    /// Reading or writing a session's raw audio backup failed.
    Backup,
}

/// Errors raised by the transcription session registry.
#[derive(Debug, PartialEq)]
pub enum SessionErrorKind {
    NotFound,
    AlreadyExists,
}

/// Enum representing the various kinds of external errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum ExternalErrorKind {
    /// An AI operation failed after the orchestrator exhausted its own retries.
    Ai,
    /// A persistence collaborator (notes, coaching records) rejected a call.
    Collaborator(String),
}

impl Error {
    pub fn session_not_found(session_id: &str) -> Self {
        Error {
            source: None,
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Session(
                SessionErrorKind::NotFound,
            )),
        }
        .with_context(format!("no active session {session_id}"))
    }

    pub fn session_already_exists(session_id: &str) -> Self {
        Error {
            source: None,
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Session(
                SessionErrorKind::AlreadyExists,
            )),
        }
        .with_context(format!("session {session_id} is already active"))
    }

    pub fn collaborator(message: impl Into<String>) -> Self {
        Error {
            source: None,
            error_kind: DomainErrorKind::External(ExternalErrorKind::Collaborator(message.into())),
        }
    }

    /// Attach a human-readable message as the source when none is present.
    fn with_context(mut self, message: String) -> Self {
        if self.source.is_none() {
            self.source = Some(message.into());
        }
        self
    }

    /// The AI error behind this domain error, if it came from the orchestrator.
    pub fn ai_error(&self) -> Option<&AiError> {
        self.source
            .as_ref()
            .and_then(|source| source.downcast_ref::<AiError>())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Domain Error: {:?}: {source}", self.error_kind),
            None => write!(f, "Domain Error: {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

// This is where we translate errors from the `meeting-ai` layer to the `domain` layer.
impl From<AiError> for Error {
    fn from(err: AiError) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::External(ExternalErrorKind::Ai),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Backup),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_error_translation_keeps_source() {
        let err: Error = AiError::Transient("connection reset".to_string()).into();

        assert_eq!(
            err.error_kind,
            DomainErrorKind::External(ExternalErrorKind::Ai)
        );
        assert_eq!(
            err.ai_error(),
            Some(&AiError::Transient("connection reset".to_string()))
        );
    }

    #[test]
    fn test_io_error_is_backup_failure() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();

        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Backup)
        );
        assert!(err.ai_error().is_none());
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn test_session_errors_name_the_session() {
        let err = Error::session_not_found("abc");
        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Session(SessionErrorKind::NotFound))
        );
        assert!(err.to_string().contains("abc"));
    }
}
