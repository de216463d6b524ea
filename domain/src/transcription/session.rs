use chrono::{DateTime, Utc};
use events::{EventHandler, ListenerId, SessionEvent, SessionEventKind};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::backup::AudioBackup;
use super::{SessionSnapshot, SessionState};
use crate::error::Error;

/// Mutable part of a session. Only touched under `Session::inner`, never
/// across an await.
pub(crate) struct SessionInner {
    pub(crate) state: SessionState,
    pub(crate) buffer: Vec<u8>,
    pub(crate) last_flush: Instant,
    pub(crate) transcript: String,
    pub(crate) consecutive_failures: u32,
    pub(crate) degraded: bool,
    pub(crate) last_error: Option<String>,
    listeners: HashMap<ListenerId, Arc<dyn EventHandler>>,
}

impl SessionInner {
    /// Appends one line to the transcript.
    pub(crate) fn push_line(&mut self, line: &str) {
        if !self.transcript.is_empty() {
            self.transcript.push('\n');
        }
        self.transcript.push_str(line);
    }

    pub(crate) fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }
}

/// One live transcription session.
///
/// Three locks, always taken in this order when nested:
/// `flush_lock` serializes flushes (and finalization) so transcript lines stay
/// in buffer order; `publish_lock` orders state changes with event delivery so
/// a late listener never sees a line twice or misses one; `inner` guards the
/// state itself. The backup file has its own lock so disk writes never wait on
/// a transcription call.
pub(crate) struct Session {
    pub(crate) id: String,
    pub(crate) meeting_id: String,
    pub(crate) user_id: String,
    pub(crate) started_at: DateTime<Utc>,
    backup_path: PathBuf,
    pub(crate) flush_lock: tokio::sync::Mutex<()>,
    publish_lock: tokio::sync::Mutex<()>,
    backup: tokio::sync::Mutex<AudioBackup>,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub(crate) fn new(id: &str, meeting_id: &str, user_id: &str, backup: AudioBackup) -> Self {
        Self {
            id: id.to_string(),
            meeting_id: meeting_id.to_string(),
            user_id: user_id.to_string(),
            started_at: Utc::now(),
            backup_path: backup.path().to_path_buf(),
            flush_lock: tokio::sync::Mutex::new(()),
            publish_lock: tokio::sync::Mutex::new(()),
            backup: tokio::sync::Mutex::new(backup),
            inner: Mutex::new(SessionInner {
                state: SessionState::Started,
                buffer: Vec::new(),
                last_flush: Instant::now(),
                transcript: String::new(),
                consecutive_failures: 0,
                degraded: false,
                last_error: None,
                listeners: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` against the session state without publishing anything.
    pub(crate) fn with_inner<R>(&self, f: impl FnOnce(&mut SessionInner) -> R) -> R {
        f(&mut self.lock())
    }

    pub(crate) fn backup_path(&self) -> &PathBuf {
        &self.backup_path
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.lock().state == SessionState::Ended
    }

    /// Non-empty buffer whose last flush is at least `threshold` old.
    pub(crate) fn is_stale(&self, threshold: Duration) -> bool {
        let inner = self.lock();
        inner.state != SessionState::Ended
            && !inner.buffer.is_empty()
            && inner.last_flush.elapsed() >= threshold
    }

    /// Writes the chunk to the backup file, then buffers it for transcription.
    ///
    /// The chunk is buffered even when the disk write fails, and the backup lock is
    /// held across both steps so concurrent chunks land in the same order in
    /// the file and the buffer.
    pub(crate) async fn record_audio(&self, bytes: &[u8]) -> Result<(), Error> {
        let mut backup = self.backup.lock().await;
        let written = backup.append(bytes).await;

        {
            let mut inner = self.lock();
            if inner.state == SessionState::Ended {
                return Err(Error::session_not_found(&self.id));
            }
            // A degraded session only records; nothing will transcribe the buffer.
            if !inner.degraded {
                inner.buffer.extend_from_slice(bytes);
                if inner.state == SessionState::Started {
                    inner.state = SessionState::Buffering;
                }
            }
        }

        written
    }

    /// Applies `update` to the state and delivers the event it returns, if any,
    /// to every listener before any other publish can run.
    pub(crate) async fn publish<F>(&self, update: F)
    where
        F: FnOnce(&mut SessionInner) -> Option<SessionEventKind>,
    {
        let _ordered = self.publish_lock.lock().await;
        let (kind, listeners) = {
            let mut inner = self.lock();
            let kind = update(&mut inner);
            let listeners: Vec<_> = inner.listeners.values().cloned().collect();
            (kind, listeners)
        };

        if let Some(kind) = kind {
            let event = SessionEvent::new(self.id.clone(), kind);
            for listener in listeners {
                listener.handle(&event).await;
            }
        }
    }

    /// Registers `listener` and sends it the transcript so far.
    pub(crate) async fn attach(&self, listener: Arc<dyn EventHandler>) -> ListenerId {
        let _ordered = self.publish_lock.lock().await;
        let id = ListenerId::new();
        let kind = {
            let mut inner = self.lock();
            inner.listeners.insert(id, Arc::clone(&listener));
            SessionEventKind::Started {
                meeting_id: self.meeting_id.clone(),
                transcript: inner.transcript.clone(),
                degraded: inner.degraded,
            }
        };

        listener
            .handle(&SessionEvent::new(self.id.clone(), kind))
            .await;
        id
    }

    pub(crate) fn detach(&self, id: &ListenerId) -> bool {
        self.lock().listeners.remove(id).is_some()
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            session_id: self.id.clone(),
            meeting_id: self.meeting_id.clone(),
            user_id: self.user_id.clone(),
            state: inner.state,
            degraded: inner.degraded,
            transcript: inner.transcript.clone(),
            buffered_bytes: inner.buffer.len(),
            consecutive_failures: inner.consecutive_failures,
            last_error: inner.last_error.clone(),
            listeners: inner.listeners.len(),
            backup_path: self.backup_path.clone(),
            started_at: self.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::ChannelListener;
    use tokio::sync::mpsc;

    async fn session(dir: &std::path::Path) -> Session {
        let backup = AudioBackup::open(dir, "s1").await.unwrap();
        Session::new("s1", "m1", "u1", backup)
    }

    #[tokio::test]
    async fn test_first_chunk_moves_to_buffering() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path()).await;
        assert_eq!(session.snapshot().state, SessionState::Started);

        session.record_audio(b"abc").await.unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Buffering);
        assert_eq!(snapshot.buffered_bytes, 3);
    }

    #[tokio::test]
    async fn test_degraded_session_records_without_buffering() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path()).await;
        session.with_inner(|inner| inner.degraded = true);

        session.record_audio(b"abc").await.unwrap();

        assert_eq!(session.snapshot().buffered_bytes, 0);
        assert_eq!(
            tokio::fs::read(session.backup_path()).await.unwrap(),
            b"abc"
        );
    }

    #[tokio::test]
    async fn test_late_listener_receives_history_then_updates() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path()).await;
        session
            .publish(|inner| {
                inner.push_line("first");
                None
            })
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        session.attach(Arc::new(ChannelListener::new(tx))).await;
        session
            .publish(|inner| {
                inner.push_line("second");
                Some(SessionEventKind::Fallback {
                    message: "down".to_string(),
                })
            })
            .await;

        match rx.recv().await.unwrap().kind {
            SessionEventKind::Started { transcript, .. } => assert_eq!(transcript, "first"),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(rx.recv().await.unwrap().event_type(), "fallback");
        assert_eq!(session.snapshot().transcript, "first\nsecond");
    }

    #[tokio::test]
    async fn test_detached_listener_stops_receiving() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path()).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = session.attach(Arc::new(ChannelListener::new(tx))).await;
        rx.recv().await.unwrap();

        assert!(session.detach(&id));
        assert!(!session.detach(&id));
        session
            .publish(|_| {
                Some(SessionEventKind::Completed {
                    transcript: String::new(),
                })
            })
            .await;

        assert!(rx.try_recv().is_err());
    }
}
