//! The four layers of the orchestrator stack, innermost last.

use async_trait::async_trait;
use log::*;
use std::sync::Arc;

use super::config::OrchestratorConfig;
use crate::cache::CacheStore;
use crate::debounce::DebounceCoordinator;
use crate::layer::Layer;
use crate::resilience::{CircuitBreakerRegistry, RetryDecision};
use crate::traits::{generation, transcription};
use crate::types::operation::{Completion, Input, OperationRequest};
use crate::types::prompt::Prompt;
use crate::Error;

/// Outermost layer: answers from the cache and stores fresh results.
pub(crate) struct CacheLayer {
    pub(crate) inner: Arc<dyn Layer>,
    pub(crate) store: Arc<dyn CacheStore<Completion>>,
    pub(crate) config: Arc<OrchestratorConfig>,
}

#[async_trait]
impl Layer for CacheLayer {
    async fn execute(&self, request: OperationRequest) -> Result<Completion, Error> {
        let Some(ttl) = self.config.cache_ttl(request.operation) else {
            return self.inner.execute(request).await;
        };

        let key = request.cache_key();
        if let Some(hit) = self.store.get(&key).await {
            debug!("Cache hit for {key}");
            return Ok(hit);
        }

        trace!("Cache miss for {key}");
        let completion = self.inner.execute(request).await?;
        self.store.set(&key, completion.clone(), ttl).await;
        Ok(completion)
    }
}

/// Coalesces bursts of equivalent text calls before they reach the network.
pub(crate) struct DebounceLayer {
    pub(crate) inner: Arc<dyn Layer>,
    pub(crate) coordinator: Arc<DebounceCoordinator>,
    pub(crate) config: Arc<OrchestratorConfig>,
}

#[async_trait]
impl Layer for DebounceLayer {
    async fn execute(&self, request: OperationRequest) -> Result<Completion, Error> {
        match self.config.debounce_window(request.operation) {
            Some(window) if !window.is_zero() => {
                self.coordinator
                    .debounce(request, window, Arc::clone(&self.inner))
                    .await
            }
            _ => self.inner.execute(request).await,
        }
    }
}

/// Guards each attempt with the operation's circuit breaker, applies the call
/// timeout and retries transient failures with exponential backoff.
pub(crate) struct ResilienceLayer {
    pub(crate) inner: Arc<dyn Layer>,
    pub(crate) breakers: CircuitBreakerRegistry,
    pub(crate) config: Arc<OrchestratorConfig>,
}

#[async_trait]
impl Layer for ResilienceLayer {
    async fn execute(&self, request: OperationRequest) -> Result<Completion, Error> {
        let operation = request.operation;
        let policy = self.config.policy(operation);
        let timeout = policy.tuning.with_overrides(&request.overrides).timeout;

        let mut n_past_retries = 0;
        let mut last_error: Option<Error> = None;

        loop {
            let permit = match self.breakers.acquire(operation) {
                Ok(permit) => permit,
                // The breaker opened between retries; report the failure that caused it.
                Err(open) => return Err(last_error.unwrap_or(open)),
            };

            let attempt = tokio::time::timeout(timeout, self.inner.execute(request.clone()));
            let result = match attempt.await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(format!(
                    "{operation} exceeded {}ms",
                    timeout.as_millis()
                ))),
            };

            let error = match result {
                Ok(completion) => {
                    permit.success();
                    return Ok(completion);
                }
                // The provider answered; there was just nothing to transcribe.
                Err(Error::NoAudioData) => {
                    permit.success();
                    return Err(Error::NoAudioData);
                }
                Err(error) => {
                    permit.failure();
                    error
                }
            };

            match policy.retry.should_retry(n_past_retries, &error) {
                RetryDecision::Retry { after } => {
                    warn!(
                        "{operation} attempt {} failed ({error}), retrying in {}ms",
                        n_past_retries + 1,
                        after.as_millis()
                    );
                    tokio::time::sleep(after).await;
                    n_past_retries += 1;
                    last_error = Some(error);
                }
                RetryDecision::DoNotRetry => {
                    if n_past_retries > 0 || error.is_retryable() {
                        error!(
                            "{operation} failed after {} attempt(s): {error}",
                            n_past_retries + 1
                        );
                    }
                    return Err(error);
                }
            }
        }
    }
}

/// Innermost layer: builds the prompt and calls the raw provider once.
pub(crate) struct ProviderLayer {
    pub(crate) generator: Arc<dyn generation::Provider>,
    pub(crate) transcriber: Arc<dyn transcription::Provider>,
    pub(crate) config: Arc<OrchestratorConfig>,
}

#[async_trait]
impl Layer for ProviderLayer {
    async fn execute(&self, request: OperationRequest) -> Result<Completion, Error> {
        let operation = request.operation;
        let tuning = self
            .config
            .policy(operation)
            .tuning
            .with_overrides(&request.overrides);

        match request.input {
            Input::Audio(audio) => {
                if audio.is_empty() {
                    return Err(Error::NoAudioData);
                }
                trace!(
                    "Transcribing {} bytes with {}",
                    audio.len(),
                    self.transcriber.provider_id()
                );
                self.transcriber
                    .transcribe(audio, tuning)
                    .await
                    .map(Completion::Text)
            }
            Input::Text(arguments) => {
                let prompt = Prompt::for_operation(operation, &arguments);
                trace!("Calling {} for {operation}", self.generator.provider_id());
                self.generator.generate(operation, prompt, tuning).await
            }
        }
    }
}
