//! Persistence boundary for AI-generated coaching output.

use crate::error::Error;
use async_trait::async_trait;
use std::fmt;

/// What kind of suggestion is being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionType {
    /// Structured coaching feedback on the meeting transcript.
    Coaching,
    /// A short summary of the meeting.
    Summary,
}

impl SuggestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionType::Coaching => "coaching",
            SuggestionType::Summary => "summary",
        }
    }
}

impl fmt::Display for SuggestionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait CoachingService: Send + Sync {
    async fn record_coaching_suggestion(
        &self,
        meeting_id: &str,
        suggestion_type: SuggestionType,
        content: &str,
    ) -> Result<(), Error>;
}
