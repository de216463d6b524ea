//! Live transcription session events.
//!
//! This crate defines the push channel between the transcription session manager
//! and whatever transport delivers updates to clients (SSE, websockets).
//!
//! # Architecture
//!
//! - **SessionEvent**: typed event `{ type, sessionId, payload }` emitted by a session
//! - **EventHandler**: trait implemented by every subscribed listener
//! - **ChannelListener**: forwards events into a tokio mpsc channel for a transport
//!
//! This crate has no dependencies on internal crates, so transports can depend on
//! it without pulling in the AI or domain layers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Identifies one listener attached to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Event pushed to a session's listeners.
///
/// Serializes as `{"type": "...", "sessionId": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEvent {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(flatten)]
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionEventKind {
    /// Sent when a session starts and to every late subscriber, carrying the
    /// transcript accumulated so far so no history is missed.
    Started {
        meeting_id: String,
        transcript: String,
        degraded: bool,
    },
    /// An incremental transcript line from one flush.
    Chunk {
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// Transcription is unavailable for the rest of the session; audio is still
    /// being recorded.
    Fallback { message: String },
    /// A flush failed. `retrying` is true while the session is below its failure
    /// threshold.
    Error { message: String, retrying: bool },
    /// The session ended and its transcript was finalized.
    Completed { transcript: String },
}

impl SessionEvent {
    pub fn new(session_id: impl Into<String>, kind: SessionEventKind) -> Self {
        Self {
            session_id: session_id.into(),
            kind,
        }
    }

    /// Event type name as it appears on the wire.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            SessionEventKind::Started { .. } => "started",
            SessionEventKind::Chunk { .. } => "chunk",
            SessionEventKind::Fallback { .. } => "fallback",
            SessionEventKind::Error { .. } => "error",
            SessionEventKind::Completed { .. } => "completed",
        }
    }
}

/// Trait for receiving session events.
/// Implementations must not block; slow transports should buffer internally.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &SessionEvent);
}

/// Forwards events into an unbounded channel read by a transport task.
pub struct ChannelListener {
    sender: UnboundedSender<SessionEvent>,
}

impl ChannelListener {
    pub fn new(sender: UnboundedSender<SessionEvent>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl EventHandler for ChannelListener {
    async fn handle(&self, event: &SessionEvent) {
        // A closed receiver means the client went away; the session keeps going.
        let _ = self.sender.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let event = SessionEvent::new(
            "s-1",
            SessionEventKind::Fallback {
                message: "Transcription unavailable".to_string(),
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "sessionId": "s-1",
                "type": "fallback",
                "payload": { "message": "Transcription unavailable" }
            })
        );
        assert_eq!(event.event_type(), "fallback");
    }

    #[test]
    fn test_event_type_names() {
        let completed = SessionEvent::new(
            "s",
            SessionEventKind::Completed {
                transcript: String::new(),
            },
        );
        assert_eq!(completed.event_type(), "completed");

        let error = SessionEvent::new(
            "s",
            SessionEventKind::Error {
                message: "x".into(),
                retrying: true,
            },
        );
        assert_eq!(error.event_type(), "error");
    }

    #[tokio::test]
    async fn test_channel_listener_forwards_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let listener = ChannelListener::new(tx);
        let event = SessionEvent::new(
            "s-2",
            SessionEventKind::Started {
                meeting_id: "m".into(),
                transcript: String::new(),
                degraded: false,
            },
        );

        listener.handle(&event).await;
        assert_eq!(rx.recv().await, Some(event));
    }

    #[tokio::test]
    async fn test_channel_listener_ignores_closed_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let listener = ChannelListener::new(tx);
        listener
            .handle(&SessionEvent::new(
                "s",
                SessionEventKind::Completed {
                    transcript: "t".into(),
                },
            ))
            .await;
    }
}
