//! Registry and lifecycle of live transcription sessions.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use events::{EventHandler, ListenerId, SessionEventKind};
use log::*;
use meeting_ai::{Error as AiError, Orchestrator};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use super::backup::AudioBackup;
use super::session::Session;
use super::{
    SessionConfig, SessionSnapshot, SessionState, DEGRADED_SUMMARY_HEADING, FALLBACK_NOTICE,
};
use crate::coaching::{CoachingService, SuggestionType};
use crate::error::Error;
use crate::note::NoteService;

/// Shortest tick the background flush loop will run at.
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(10);

struct Shared {
    sessions: DashMap<String, Arc<Session>>,
    orchestrator: Arc<Orchestrator>,
    notes: Arc<dyn NoteService>,
    coaching: Arc<dyn CoachingService>,
    config: SessionConfig,
}

/// Owns every active transcription session.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        notes: Arc<dyn NoteService>,
        coaching: Arc<dyn CoachingService>,
        config: SessionConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                sessions: DashMap::new(),
                orchestrator,
                notes,
                coaching,
                config,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Registers a new session, opens its audio backup and attaches `listener`,
    /// which immediately receives a `started` event.
    pub async fn start_session(
        &self,
        session_id: &str,
        meeting_id: &str,
        user_id: &str,
        listener: Arc<dyn EventHandler>,
    ) -> Result<ListenerId, Error> {
        if self.shared.sessions.contains_key(session_id) {
            return Err(Error::session_already_exists(session_id));
        }

        let backup = AudioBackup::open(&self.shared.config.backup_dir, session_id).await?;
        let session = Arc::new(Session::new(session_id, meeting_id, user_id, backup));

        match self.shared.sessions.entry(session_id.to_string()) {
            Entry::Occupied(_) => return Err(Error::session_already_exists(session_id)),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&session));
            }
        }

        info!(
            "Transcription session {session_id} started for meeting {meeting_id} (user {user_id}), backup at {}",
            session.backup_path().display()
        );
        Ok(session.attach(listener).await)
    }

    /// Backs the chunk up to disk and buffers it. If the buffer has gone
    /// unflushed for longer than the flush threshold, a flush is started in the
    /// background.
    ///
    /// A backup write failure is returned as an error, but the chunk has still
    /// been buffered for transcription.
    pub async fn add_audio_chunk(&self, session_id: &str, bytes: &[u8]) -> Result<(), Error> {
        let session = self.session(session_id)?;
        let recorded = session.record_audio(bytes).await;
        if let Err(err) = &recorded {
            error!("Failed to back up audio for session {session_id}: {err}");
        }

        if session.is_stale(self.shared.config.flush_threshold) {
            let manager = self.clone();
            tokio::spawn(async move {
                manager.try_flush(&session).await;
            });
        }

        recorded
    }

    /// Drains the session's buffer now, waiting for any flush already running.
    pub async fn flush_session(&self, session_id: &str) -> Result<(), Error> {
        let session = self.session(session_id)?;
        let _flushing = session.flush_lock.lock().await;
        if session.is_ended() {
            return Err(Error::session_not_found(session_id));
        }
        self.drain(&session).await;
        Ok(())
    }

    /// Finalizes the session and returns its final text.
    ///
    /// Any remaining audio is flushed, the transcript is cleaned up (or, for a
    /// degraded session, annotated with what went wrong), persisted as a meeting
    /// note, and analysed for coaching. Persistence failures fall back to a
    /// minimal note pointing at the audio backup. The backup file is left on disk.
    pub async fn end_session(&self, session_id: &str) -> Result<String, Error> {
        let session = self.session(session_id)?;
        let already_ended = session.with_inner(|inner| {
            let ended = inner.state == SessionState::Ended;
            inner.state = SessionState::Ended;
            ended
        });
        if already_ended {
            return Err(Error::session_not_found(session_id));
        }
        info!("Ending transcription session {session_id}");

        let final_text = {
            // Waits for an in-flight flush and blocks any new one.
            let _flushing = session.flush_lock.lock().await;
            if !session.with_inner(|inner| inner.degraded) {
                self.drain(&session).await;
            }
            self.finalize_text(&session).await
        };

        self.persist(&session, &final_text).await;

        let completed = final_text.clone();
        session
            .publish(|_| Some(SessionEventKind::Completed { transcript: completed }))
            .await;
        self.shared.sessions.remove(session_id);
        info!(
            "Transcription session {session_id} ended ({} chars), audio kept at {}",
            final_text.len(),
            session.backup_path().display()
        );

        Ok(final_text)
    }

    /// Attaches a listener; it immediately receives the transcript so far.
    pub async fn add_listener(
        &self,
        session_id: &str,
        listener: Arc<dyn EventHandler>,
    ) -> Result<ListenerId, Error> {
        let session = self.session(session_id)?;
        Ok(session.attach(listener).await)
    }

    pub fn remove_listener(&self, session_id: &str, listener_id: &ListenerId) -> bool {
        self.shared
            .sessions
            .get(session_id)
            .map(|session| session.detach(listener_id))
            .unwrap_or(false)
    }

    pub fn active_sessions(&self) -> Vec<String> {
        self.shared
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn session_snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.shared
            .sessions
            .get(session_id)
            .map(|session| session.snapshot())
    }

    /// Flushes every session whose buffer has gone stale. Sessions are flushed
    /// concurrently; a session already flushing is skipped.
    pub async fn flush_stale_sessions(&self) {
        let threshold = self.shared.config.flush_threshold;
        let mut flushes = JoinSet::new();
        for session in self.sessions() {
            if session.is_stale(threshold) {
                let manager = self.clone();
                flushes.spawn(async move { manager.try_flush(&session).await });
            }
        }
        while let Some(joined) = flushes.join_next().await {
            if let Err(err) = joined {
                error!("Flush task failed: {err}");
            }
        }
    }

    /// Spawns the periodic flush loop. The loop ends on its own once every
    /// clone of this manager has been dropped, or when the handle is aborted.
    pub fn spawn_flush_loop(&self) -> JoinHandle<()> {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let period = self.shared.config.flush_interval.max(MIN_FLUSH_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    debug!("Session manager dropped, stopping flush loop");
                    break;
                };
                SessionManager { shared }.flush_stale_sessions().await;
            }
        })
    }

    /// Ends every active session. Returns how many ended cleanly.
    pub async fn shutdown(&self) -> usize {
        let ids = self.active_sessions();
        if !ids.is_empty() {
            info!("Ending {} active transcription session(s)", ids.len());
        }

        let mut ended = 0;
        for id in ids {
            match self.end_session(&id).await {
                Ok(_) => ended += 1,
                Err(err) => warn!("Failed to end session {id} during shutdown: {err}"),
            }
        }
        ended
    }

    fn session(&self, session_id: &str) -> Result<Arc<Session>, Error> {
        self.shared
            .sessions
            .get(session_id)
            .map(|session| Arc::clone(session.value()))
            .ok_or_else(|| Error::session_not_found(session_id))
    }

    /// Clones the registry's sessions out so no map guard is held across an await.
    fn sessions(&self) -> Vec<Arc<Session>> {
        self.shared
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Flushes unless a flush is already running or the session has ended.
    async fn try_flush(&self, session: &Session) {
        let Ok(_flushing) = session.flush_lock.try_lock() else {
            trace!("Flush already in progress for session {}", session.id);
            return;
        };
        if session.is_ended() {
            return;
        }
        self.drain(session).await;
    }

    /// Sends the buffered audio to the transcriber and records the outcome.
    /// Callers must hold the session's flush lock.
    async fn drain(&self, session: &Session) {
        let audio = session.with_inner(|inner| {
            if inner.degraded {
                inner.buffer.clear();
                return None;
            }
            if inner.buffer.is_empty() {
                return None;
            }
            inner.last_flush = Instant::now();
            if inner.state != SessionState::Ended {
                inner.state = SessionState::Flushing;
            }
            Some(inner.take_buffer())
        });
        let Some(audio) = audio else {
            return;
        };

        debug!("Flushing {} bytes for session {}", audio.len(), session.id);
        let result = self.shared.orchestrator.transcribe(audio).await;
        let threshold = self.shared.config.failure_threshold;

        session
            .publish(|inner| {
                if inner.state == SessionState::Flushing {
                    inner.state = SessionState::Buffering;
                }
                match result {
                    Ok(text) => {
                        inner.consecutive_failures = 0;
                        let text = text.trim();
                        if text.is_empty() {
                            return None;
                        }
                        let timestamp = Utc::now();
                        inner.push_line(&format!("[{}] {text}", timestamp.format("%H:%M:%S")));
                        Some(SessionEventKind::Chunk {
                            text: text.to_string(),
                            timestamp,
                        })
                    }
                    Err(AiError::NoAudioData) => {
                        debug!("No speech in flushed audio for session {}", session.id);
                        None
                    }
                    Err(err) => {
                        inner.consecutive_failures += 1;
                        inner.last_error = Some(err.to_string());

                        if inner.consecutive_failures >= threshold {
                            inner.degraded = true;
                            inner.buffer.clear();
                            inner.push_line(FALLBACK_NOTICE);
                            error!(
                                "Transcription failed {} times for session {}, continuing in recording-only mode: {err}",
                                inner.consecutive_failures, session.id
                            );
                            Some(SessionEventKind::Fallback {
                                message: format!(
                                    "Live transcription is unavailable ({err}). Recording continues."
                                ),
                            })
                        } else {
                            warn!(
                                "Transcription flush failed for session {} ({}/{threshold}): {err}",
                                session.id, inner.consecutive_failures
                            );
                            Some(SessionEventKind::Error {
                                message: err.to_string(),
                                retrying: true,
                            })
                        }
                    }
                }
            })
            .await;
    }

    async fn finalize_text(&self, session: &Session) -> String {
        let (transcript, degraded, last_error) = session.with_inner(|inner| {
            (
                inner.transcript.clone(),
                inner.degraded,
                inner.last_error.clone(),
            )
        });

        if degraded {
            let summary = format!(
                "--- {DEGRADED_SUMMARY_HEADING} ---\nLast error: {}\nThe full audio recording was saved to {} and can be transcribed manually.",
                last_error.as_deref().unwrap_or("unknown"),
                session.backup_path().display()
            );
            return if transcript.is_empty() {
                summary
            } else {
                format!("{transcript}\n\n{summary}")
            };
        }

        if transcript.trim().is_empty() {
            return transcript;
        }
        let orchestrator = self.shared.orchestrator.scoped(session.meeting_id.as_str());
        match orchestrator.cleanup_transcript(&transcript).await {
            Ok(cleaned) if !cleaned.trim().is_empty() => cleaned,
            Ok(_) => {
                warn!("Transcript cleanup returned nothing for session {}, keeping raw text", session.id);
                transcript
            }
            Err(err) => {
                warn!("Transcript cleanup failed for session {}, keeping raw text: {err}", session.id);
                transcript
            }
        }
    }

    /// Hands the final text to the note and coaching collaborators. Never fails:
    /// a rejected note is replaced by a minimal fallback note and coaching
    /// failures are only logged.
    async fn persist(&self, session: &Session, final_text: &str) {
        let meeting_id = session.meeting_id.as_str();

        if let Err(err) = self
            .shared
            .notes
            .create_or_append_note(meeting_id, final_text)
            .await
        {
            error!("Saving transcript note for meeting {meeting_id} failed: {err}");
            let fallback = format!(
                "The transcript for this meeting could not be saved automatically. The audio recording is stored at {}.",
                session.backup_path().display()
            );
            if let Err(err) = self
                .shared
                .notes
                .create_or_append_note(meeting_id, &fallback)
                .await
            {
                error!("Fallback note for meeting {meeting_id} also failed: {err}");
            }
        }

        let degraded = session.with_inner(|inner| inner.degraded);
        if degraded || final_text.trim().is_empty() {
            return;
        }

        // Scoped so another meeting ending at the same time cannot supersede
        // this meeting's debounced calls.
        let orchestrator = self.shared.orchestrator.scoped(meeting_id);
        match orchestrator.generate_coaching(final_text, None).await {
            Ok(coaching) => {
                self.record(meeting_id, SuggestionType::Coaching, &coaching.to_string())
                    .await
            }
            Err(err) => warn!("Coaching analysis failed for meeting {meeting_id}: {err}"),
        }

        match orchestrator.generate_summary(final_text).await {
            Ok(summary) => self.record(meeting_id, SuggestionType::Summary, &summary).await,
            Err(err) => warn!("Summary generation failed for meeting {meeting_id}: {err}"),
        }
    }

    async fn record(&self, meeting_id: &str, suggestion_type: SuggestionType, content: &str) {
        if let Err(err) = self
            .shared
            .coaching
            .record_coaching_suggestion(meeting_id, suggestion_type, content)
            .await
        {
            warn!("Recording {suggestion_type} for meeting {meeting_id} failed: {err}");
        }
    }
}
