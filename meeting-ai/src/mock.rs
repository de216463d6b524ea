//! Scripted providers for tests (enabled by the `mock` feature).

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::traits::{generation, transcription};
use crate::types::operation::{Completion, Operation, Tuning};
use crate::types::prompt::Prompt;
use crate::Error;

type GenerateFn = dyn Fn(Operation, &Prompt, usize) -> Result<Completion, Error> + Send + Sync;
type TranscribeFn = dyn Fn(&[u8], usize) -> Result<String, Error> + Send + Sync;

/// Text generator whose responses come from a closure receiving the operation,
/// the prompt and the zero-based call index.
pub struct ScriptedGenerator {
    respond: Box<GenerateFn>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<(Operation, Prompt)>>,
}

impl ScriptedGenerator {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(Operation, &Prompt, usize) -> Result<Completion, Error> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Responds with the prompt's user content.
    pub fn echo() -> Self {
        Self::new(|_, prompt, _| Ok(Completion::Text(prompt.user.clone())))
    }

    pub fn always_failing(error: Error) -> Self {
        Self::new(move |_, _, _| Err(error.clone()))
    }

    /// Fails the first `failures` calls with `error`, then echoes.
    pub fn failing_first(failures: usize, error: Error) -> Self {
        Self::new(move |_, prompt, call| {
            if call < failures {
                Err(error.clone())
            } else {
                Ok(Completion::Text(prompt.user.clone()))
            }
        })
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, operation: Operation) -> usize {
        self.prompts()
            .iter()
            .filter(|(op, _)| *op == operation)
            .count()
    }

    pub fn prompts(&self) -> Vec<(Operation, Prompt)> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl generation::Provider for ScriptedGenerator {
    async fn generate(
        &self,
        operation: Operation,
        prompt: Prompt,
        _tuning: Tuning,
    ) -> Result<Completion, Error> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push((operation, prompt.clone()));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(operation, &prompt, call)
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

/// Transcriber whose responses come from a closure receiving the audio and the
/// zero-based call index.
pub struct ScriptedTranscriber {
    respond: Box<TranscribeFn>,
    calls: AtomicUsize,
    received: Mutex<Vec<Arc<[u8]>>>,
}

impl ScriptedTranscriber {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&[u8], usize) -> Result<String, Error> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Treats the audio bytes as UTF-8 text, which makes ordering easy to assert.
    pub fn utf8() -> Self {
        Self::new(|audio, _| Ok(String::from_utf8_lossy(audio).into_owned()))
    }

    /// Always answers `text`.
    pub fn constant(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_, _| Ok(text.clone()))
    }

    pub fn always_failing(error: Error) -> Self {
        Self::new(move |_, _| Err(error.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Arc<[u8]>> {
        self.received
            .lock()
            .map(|received| received.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl transcription::Provider for ScriptedTranscriber {
    async fn transcribe(&self, audio: Arc<[u8]>, _tuning: Tuning) -> Result<String, Error> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut received) = self.received.lock() {
            received.push(Arc::clone(&audio));
        }
        (self.respond)(&audio, call)
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}
