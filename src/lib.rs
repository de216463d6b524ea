//! Sales assistant runtime.
//!
//! [`Assistant`] is the composition root: it reads the service configuration,
//! builds the one AI orchestrator and the one transcription session manager for
//! the process, and runs the background flush loop until shutdown. Provider
//! adapters and persistence collaborators are injected by the embedding
//! application.

use domain::{settings, CoachingService, NoteService, SessionManager};
use log::*;
use meeting_ai::{Orchestrator, TextGenerator, Transcriber};
use service::config::Config;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

pub use domain::SessionConfig;
pub use meeting_ai::OrchestratorConfig;

/// External capabilities the assistant is built around.
pub struct Collaborators {
    pub generator: Arc<dyn TextGenerator>,
    pub transcriber: Arc<dyn Transcriber>,
    pub notes: Arc<dyn NoteService>,
    pub coaching: Arc<dyn CoachingService>,
}

pub struct Assistant {
    config: Config,
    orchestrator: Arc<Orchestrator>,
    sessions: SessionManager,
    flush_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Assistant {
    /// Builds everything from `config` and starts the session flush loop.
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let orchestrator = Arc::new(
            Orchestrator::builder(collaborators.generator, collaborators.transcriber)
                .config(settings::orchestrator_config(&config))
                .cache_strategy(settings::cache_strategy(&config))
                .build(),
        );
        let sessions = SessionManager::new(
            Arc::clone(&orchestrator),
            collaborators.notes,
            collaborators.coaching,
            settings::session_config(&config),
        );
        let flush_loop = sessions.spawn_flush_loop();

        info!(
            "Sales assistant started in {} environment",
            config.runtime_env()
        );

        Self {
            config,
            orchestrator,
            sessions,
            flush_loop: Mutex::new(Some(flush_loop)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Stops the flush loop, ends every active session so buffered audio is
    /// transcribed and persisted, then fires any debounced AI calls still
    /// waiting. Returns the number of sessions ended. Safe to call twice.
    pub async fn shutdown(&self) -> usize {
        let flush_loop = self
            .flush_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(flush_loop) = flush_loop {
            flush_loop.abort();
        }

        let ended = self.sessions.shutdown().await;
        self.orchestrator.shutdown().await;
        info!("Sales assistant stopped ({ended} session(s) finalized)");
        ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{MockCoachingService, MockNoteService};
    use events::ChannelListener;
    use meeting_ai::mock::{ScriptedGenerator, ScriptedTranscriber};
    use meeting_ai::{Completion, Operation};
    use std::path::Path;
    use tokio::sync::mpsc;

    fn test_config(backup_dir: &Path) -> Config {
        Config::try_from_args([
            "sales-assistant",
            "--runtime-env",
            "test",
            "--transcription-backup-dir",
            backup_dir.to_str().unwrap(),
        ])
        .unwrap()
    }

    fn collaborators(
        generator: Arc<ScriptedGenerator>,
        notes: MockNoteService,
    ) -> Collaborators {
        let mut coaching = MockCoachingService::new();
        coaching
            .expect_record_coaching_suggestion()
            .returning(|_, _, _| Ok(()));
        Collaborators {
            generator,
            transcriber: Arc::new(ScriptedTranscriber::utf8()),
            notes: Arc::new(notes),
            coaching: Arc::new(coaching),
        }
    }

    fn generator() -> Arc<ScriptedGenerator> {
        Arc::new(ScriptedGenerator::new(|operation, prompt, _| match operation {
            Operation::Analyze | Operation::Coach => {
                Ok(Completion::Json(serde_json::json!({ "ok": true })))
            }
            _ => Ok(Completion::Text(prompt.user.clone())),
        }))
    }

    #[tokio::test]
    async fn test_test_environment_calls_provider_every_time() {
        let dir = tempfile::tempdir().unwrap();
        let generator = generator();
        let assistant = Assistant::new(
            test_config(dir.path()),
            collaborators(Arc::clone(&generator), MockNoteService::new()),
        );

        assistant.orchestrator().analyze("notes", None).await.unwrap();
        assistant.orchestrator().analyze("notes", None).await.unwrap();

        assert_eq!(generator.calls_for(Operation::Analyze), 2);
        assert_eq!(assistant.orchestrator().cache_stats().entries, 0);
        assistant.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_finalizes_open_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let mut notes = MockNoteService::new();
        notes
            .expect_create_or_append_note()
            .times(1)
            .withf(|meeting_id, text| meeting_id == "meeting-9" && text.contains("closing words"))
            .returning(|_, _| Ok(()));
        let assistant = Assistant::new(test_config(dir.path()), collaborators(generator(), notes));
        let (tx, mut rx) = mpsc::unbounded_channel();

        assistant
            .sessions()
            .start_session("s1", "meeting-9", "user-1", Arc::new(ChannelListener::new(tx)))
            .await
            .unwrap();
        assistant
            .sessions()
            .add_audio_chunk("s1", b"closing words")
            .await
            .unwrap();

        assert_eq!(assistant.shutdown().await, 1);
        assert!(assistant.sessions().active_sessions().is_empty());
        assert_eq!(assistant.shutdown().await, 0);

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        assert_eq!(last.map(|event| event.event_type()), Some("completed"));
    }

    #[tokio::test]
    async fn test_session_settings_come_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let assistant = Assistant::new(
            test_config(dir.path()),
            collaborators(generator(), MockNoteService::new()),
        );

        let session_config = assistant.sessions().config();
        assert_eq!(session_config.backup_dir, dir.path());
        assert_eq!(
            session_config.failure_threshold,
            assistant.config().transcription_failure_threshold
        );
        assistant.shutdown().await;
    }
}
