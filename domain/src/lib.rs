//! Domain layer for the sales assistant.
//!
//! Owns live meeting transcription sessions and the boundaries to the
//! collaborators that persist their results. AI work is delegated to the
//! `meeting-ai` orchestrator; session updates are pushed through `events`.

pub mod coaching;
pub mod error;
pub mod note;
pub mod settings;
pub mod transcription;

pub use coaching::{CoachingService, SuggestionType};
pub use note::NoteService;
pub use transcription::{SessionConfig, SessionManager, SessionSnapshot, SessionState};

#[cfg(any(test, feature = "mock"))]
pub use coaching::MockCoachingService;
#[cfg(any(test, feature = "mock"))]
pub use note::MockNoteService;
