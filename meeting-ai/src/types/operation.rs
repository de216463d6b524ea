//! Operation requests, per-call tuning and completions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// One named unit of AI work.
///
/// Each operation gets its own circuit breaker, cache TTL, debounce window and
/// retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Analyze,
    Coach,
    Chat,
    Methodology,
    FollowUp,
    Summary,
    Transcribe,
    Cleanup,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::Analyze,
        Operation::Coach,
        Operation::Chat,
        Operation::Methodology,
        Operation::FollowUp,
        Operation::Summary,
        Operation::Transcribe,
        Operation::Cleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Analyze => "analyze",
            Operation::Coach => "coach",
            Operation::Chat => "chat",
            Operation::Methodology => "methodology",
            Operation::FollowUp => "follow_up",
            Operation::Summary => "summary",
            Operation::Transcribe => "transcribe",
            Operation::Cleanup => "cleanup",
        }
    }

    /// Audio operations bypass caching and debouncing: every chunk is unique.
    pub fn is_audio(&self) -> bool {
        matches!(self, Operation::Transcribe)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a request: positional text arguments or a unit of raw audio.
#[derive(Debug, Clone)]
pub enum Input {
    Text(Vec<String>),
    Audio(Arc<[u8]>),
}

/// Optional per-call overrides of the operation's default tuning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<Duration>,
    /// Narrows debounce coalescing to callers sharing this scope (e.g. a meeting id).
    pub debounce_scope: Option<String>,
}

/// Generation parameters handed to the raw provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Tuning {
    pub fn new(temperature: f32, max_tokens: u32, timeout: Duration) -> Self {
        Self {
            temperature,
            max_tokens,
            timeout,
        }
    }

    /// Returns a copy with any per-call overrides applied.
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(temperature) = overrides.temperature {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = overrides.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(timeout) = overrides.timeout {
            self.timeout = timeout;
        }
        self
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            timeout: Duration::from_secs(30),
        }
    }
}

/// An immutable request travelling through the orchestrator's layers.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub operation: Operation,
    pub input: Input,
    pub overrides: Overrides,
}

impl OperationRequest {
    pub fn text<I, S>(operation: Operation, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operation,
            input: Input::Text(arguments.into_iter().map(Into::into).collect()),
            overrides: Overrides::default(),
        }
    }

    pub fn audio(audio: impl Into<Arc<[u8]>>) -> Self {
        Self {
            operation: Operation::Transcribe,
            input: Input::Audio(audio.into()),
            overrides: Overrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Positional text arguments; empty for audio requests.
    pub fn arguments(&self) -> &[String] {
        match &self.input {
            Input::Text(arguments) => arguments,
            Input::Audio(_) => &[],
        }
    }

    /// Serialized argument set used for near-duplicate comparison.
    pub fn serialized_arguments(&self) -> String {
        match &self.input {
            Input::Text(arguments) => {
                serde_json::to_string(arguments).unwrap_or_else(|_| arguments.join("\u{1f}"))
            }
            Input::Audio(audio) => format!("<audio:{}>", audio.len()),
        }
    }

    /// Deterministic hash of the operation's arguments and generation overrides.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.operation.as_str().as_bytes());
        match &self.input {
            Input::Text(arguments) => {
                for argument in arguments {
                    hasher.update((argument.len() as u64).to_le_bytes());
                    hasher.update(argument.as_bytes());
                }
            }
            Input::Audio(audio) => hasher.update(audio),
        }
        if let Some(temperature) = self.overrides.temperature {
            hasher.update(temperature.to_le_bytes());
        }
        if let Some(max_tokens) = self.overrides.max_tokens {
            hasher.update(max_tokens.to_le_bytes());
        }
        hex::encode(&hasher.finalize()[..16])
    }

    /// Cache key: operation name plus fingerprint.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.operation, self.fingerprint())
    }

    /// Debounce slot key: operation name plus the optional caller scope.
    pub fn debounce_key(&self) -> String {
        match &self.overrides.debounce_scope {
            Some(scope) => format!("{}:{}", self.operation, scope),
            None => self.operation.to_string(),
        }
    }
}

/// Raw provider output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum Completion {
    Text(String),
    Json(Value),
}

impl Completion {
    /// Plain-text view; structured output is rendered as compact JSON unless it
    /// is a bare string or carries a `text` field.
    pub fn into_text(self) -> String {
        match self {
            Completion::Text(text) => text,
            Completion::Json(Value::String(text)) => text,
            Completion::Json(value) => match value.get("text").and_then(Value::as_str) {
                Some(text) => text.to_string(),
                None => value.to_string(),
            },
        }
    }

    /// Structured view; text that parses as JSON is returned parsed.
    pub fn into_json(self) -> Value {
        match self {
            Completion::Json(value) => value,
            Completion::Text(text) => {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            }
        }
    }
}
