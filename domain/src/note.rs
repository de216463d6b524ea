//! Persistence boundary for meeting notes.

use crate::error::Error;
use async_trait::async_trait;

/// Stores the finalized text of a meeting. Implemented outside this crate.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait NoteService: Send + Sync {
    /// Create the meeting's note, or append to it when one already exists.
    async fn create_or_append_note(&self, meeting_id: &str, text: &str) -> Result<(), Error>;
}
