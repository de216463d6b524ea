//! Live meeting transcription.
//!
//! A session buffers incoming audio, backs every chunk up to disk, and
//! periodically drains the buffer through the AI orchestrator's transcriber.
//! Transcript lines are pushed to subscribed listeners as they arrive. When
//! transcription keeps failing the session degrades: recording continues, but no
//! further transcription is attempted and the final note explains what happened.

mod backup;
mod manager;
mod session;

pub use manager::SessionManager;

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Appended to the transcript exactly once when a session degrades.
pub const FALLBACK_NOTICE: &str =
    "[Live transcription unavailable. Recording continues and audio is being saved.]";

/// Heading of the summary appended to a degraded session's final text.
pub const DEGRADED_SUMMARY_HEADING: &str = "Transcription service encountered issues";

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// How often the background loop scans sessions for stale buffers.
    pub flush_interval: Duration,
    /// Buffered audio older than this (since the last flush) is flushed.
    pub flush_threshold: Duration,
    /// Consecutive failed flushes that put a session into DEGRADED.
    pub failure_threshold: u32,
    /// Directory holding one raw audio backup file per session.
    pub backup_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(2),
            flush_threshold: Duration::from_secs(4),
            failure_threshold: 3,
            backup_dir: PathBuf::from(service::config::DEFAULT_TRANSCRIPTION_BACKUP_DIR),
        }
    }
}

/// Lifecycle of a session. DEGRADED is tracked separately because it can
/// overlap any of the active states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Started,
    Buffering,
    Flushing,
    Ended,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionState::Started => write!(f, "started"),
            SessionState::Buffering => write!(f, "buffering"),
            SessionState::Flushing => write!(f, "flushing"),
            SessionState::Ended => write!(f, "ended"),
        }
    }
}

/// Point-in-time view of a session for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub meeting_id: String,
    pub user_id: String,
    pub state: SessionState,
    pub degraded: bool,
    pub transcript: String,
    pub buffered_bytes: usize,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub listeners: usize,
    pub backup_path: PathBuf,
    pub started_at: DateTime<Utc>,
}
