//! Structured prompts built from an operation's positional arguments.

use serde::{Deserialize, Serialize};

use super::operation::Operation;

/// System instructions plus user content handed to a text generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const ANALYZE_SYSTEM: &str = "You are a sales meeting analyst. Review the meeting notes and \
return JSON with the fields: summary, sentiment, risks, next_steps, buying_signals.";

const COACH_SYSTEM: &str = "You are a sales coach. Based on the conversation so far, return JSON \
with a `suggestions` array; each suggestion has a `type` and `content`.";

const CHAT_SYSTEM: &str = "You are a concise assistant helping a salesperson during and after \
customer meetings. Answer using the meeting context when it is relevant.";

const METHODOLOGY_SYSTEM: &str = "You are an expert in sales methodologies. Evaluate the meeting \
notes against the named methodology and return JSON with `coverage`, `gaps` and `recommendations`.";

const FOLLOW_UP_SYSTEM: &str = "You help salespeople prepare follow-ups. Return JSON with a \
`questions` array of open questions the salesperson should ask next.";

const SUMMARY_SYSTEM: &str = "Summarize the meeting for the CRM record in a few short paragraphs. \
Keep names, figures, dates and commitments exact.";

const TRANSCRIBE_SYSTEM: &str = "Transcribe the audio verbatim.";

const CLEANUP_SYSTEM: &str = "Clean up this raw meeting transcript: remove filler words \
(um, uh, like, you know), fix punctuation and casing, and keep every timestamp and every \
substantive word. Return only the cleaned transcript.";

impl Prompt {
    /// Build the prompt for `operation` from its positional arguments.
    ///
    /// Argument positions per operation:
    /// - analyze: notes, deal stage
    /// - coach: transcript or notes, deal stage
    /// - chat: message, meeting context
    /// - methodology: notes, methodology name
    /// - follow_up: notes, deal stage
    /// - summary, cleanup: text
    pub fn for_operation(operation: Operation, arguments: &[String]) -> Self {
        let first = arguments.first().map(String::as_str).unwrap_or_default();
        let second = arguments.get(1).map(String::as_str).filter(|s| !s.is_empty());

        let (system, user) = match operation {
            Operation::Analyze => (ANALYZE_SYSTEM, with_stage(first, second)),
            Operation::Coach => (COACH_SYSTEM, with_stage(first, second)),
            Operation::Chat => (
                CHAT_SYSTEM,
                match second {
                    Some(context) => format!("Meeting context:\n{context}\n\nQuestion:\n{first}"),
                    None => first.to_string(),
                },
            ),
            Operation::Methodology => (
                METHODOLOGY_SYSTEM,
                format!(
                    "Methodology: {}\n\nNotes:\n{}",
                    second.unwrap_or("MEDDIC"),
                    first
                ),
            ),
            Operation::FollowUp => (FOLLOW_UP_SYSTEM, with_stage(first, second)),
            Operation::Summary => (SUMMARY_SYSTEM, first.to_string()),
            Operation::Transcribe => (TRANSCRIBE_SYSTEM, String::new()),
            Operation::Cleanup => (CLEANUP_SYSTEM, first.to_string()),
        };

        Self {
            system: system.to_string(),
            user,
        }
    }
}

fn with_stage(content: &str, deal_stage: Option<&str>) -> String {
    match deal_stage {
        Some(stage) => format!("Deal stage: {stage}\n\n{content}"),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_includes_deal_stage() {
        let prompt = Prompt::for_operation(
            Operation::Analyze,
            &["Customer asked about pricing".to_string(), "negotiation".to_string()],
        );
        assert!(prompt.user.starts_with("Deal stage: negotiation"));
        assert!(prompt.user.contains("Customer asked about pricing"));
        assert!(prompt.system.contains("JSON"));
    }

    #[test]
    fn test_empty_stage_is_omitted() {
        let prompt = Prompt::for_operation(
            Operation::FollowUp,
            &["notes".to_string(), String::new()],
        );
        assert_eq!(prompt.user, "notes");
    }

    #[test]
    fn test_methodology_defaults_to_meddic() {
        let prompt = Prompt::for_operation(Operation::Methodology, &["notes".to_string()]);
        assert!(prompt.user.contains("Methodology: MEDDIC"));
    }

    #[test]
    fn test_chat_with_context() {
        let prompt = Prompt::for_operation(
            Operation::Chat,
            &["What did they say about budget?".to_string(), "Q3 budget approved".to_string()],
        );
        assert!(prompt.user.contains("Meeting context:\nQ3 budget approved"));
        assert!(prompt.user.ends_with("What did they say about budget?"));
    }
}
