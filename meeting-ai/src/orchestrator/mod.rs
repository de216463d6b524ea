//! The AI orchestrator: one stable operation surface over a resilience stack.
//!
//! Layers are composed once, at build time, in this fixed order (outermost first):
//!
//! ```text
//! CacheLayer -> DebounceLayer -> ResilienceLayer (breaker + retry) -> ProviderLayer
//! ```
//!
//! The order is load-bearing. A cache hit must return before a call is debounced
//! or retried, and debouncing must coalesce a burst before it reaches the breaker
//! and the network. Reordering silently breaks both guarantees.

mod config;
mod layers;

pub use config::{OperationPolicy, OrchestratorConfig};

use log::*;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStats, CacheStore, HybridCache, MemoryCache};
use crate::debounce::DebounceCoordinator;
use crate::layer::Layer;
use crate::resilience::{BreakerSnapshot, CircuitBreakerRegistry};
use crate::traits::{generation, transcription};
use crate::types::operation::{Completion, Operation, OperationRequest, Overrides};
use crate::Error;
use layers::{CacheLayer, DebounceLayer, ProviderLayer, ResilienceLayer};

/// Which [`CacheStore`] the builder creates when none is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStrategy {
    Memory { max_size: usize },
    Hybrid { front_size: usize, max_size: usize },
}

impl Default for CacheStrategy {
    fn default() -> Self {
        CacheStrategy::Memory { max_size: 500 }
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    generator: Arc<dyn generation::Provider>,
    transcriber: Arc<dyn transcription::Provider>,
    config: OrchestratorConfig,
    cache_strategy: CacheStrategy,
    cache_store: Option<Arc<dyn CacheStore<Completion>>>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.cache_strategy = strategy;
        self
    }

    /// Use an externally owned store (e.g. a shared remote cache) instead of
    /// building one from the strategy.
    pub fn cache_store(mut self, store: Arc<dyn CacheStore<Completion>>) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn build(self) -> Orchestrator {
        let config = Arc::new(self.config);
        let store = self
            .cache_store
            .unwrap_or_else(|| Self::store_for(self.cache_strategy));
        let breakers = CircuitBreakerRegistry::new(config.breaker);
        let coordinator = Arc::new(DebounceCoordinator::new(config.similarity_threshold));

        let provider: Arc<dyn Layer> = Arc::new(ProviderLayer {
            generator: self.generator,
            transcriber: self.transcriber,
            config: Arc::clone(&config),
        });
        let resilience: Arc<dyn Layer> = Arc::new(ResilienceLayer {
            inner: provider,
            breakers: breakers.clone(),
            config: Arc::clone(&config),
        });
        let debounce: Arc<dyn Layer> = Arc::new(DebounceLayer {
            inner: resilience,
            coordinator: Arc::clone(&coordinator),
            config: Arc::clone(&config),
        });
        let cache: Arc<dyn Layer> = Arc::new(CacheLayer {
            inner: debounce,
            store: Arc::clone(&store),
            config: Arc::clone(&config),
        });

        info!(
            "AI orchestrator ready (cache: {}, debounce: {}, breaker threshold: {})",
            config.cache_enabled, config.debounce_enabled, config.breaker.threshold
        );

        Orchestrator {
            entry: cache,
            store,
            breakers,
            coordinator,
            config,
            scope: None,
        }
    }

    fn store_for(strategy: CacheStrategy) -> Arc<dyn CacheStore<Completion>> {
        match strategy {
            CacheStrategy::Memory { max_size } => Arc::new(MemoryCache::new(max_size)),
            CacheStrategy::Hybrid {
                front_size,
                max_size,
            } => {
                let back: Arc<dyn CacheStore<Completion>> = Arc::new(MemoryCache::new(max_size));
                Arc::new(HybridCache::new(front_size, back, Duration::from_secs(5 * 60)))
            }
        }
    }
}

/// Stable AI operation surface used by the rest of the application.
///
/// Callers receive either a result or a tagged [`Error`]; the orchestrator never
/// substitutes default content on failure.
#[derive(Clone)]
pub struct Orchestrator {
    entry: Arc<dyn Layer>,
    store: Arc<dyn CacheStore<Completion>>,
    breakers: CircuitBreakerRegistry,
    coordinator: Arc<DebounceCoordinator>,
    config: Arc<OrchestratorConfig>,
    scope: Option<String>,
}

impl Orchestrator {
    pub fn builder(
        generator: Arc<dyn generation::Provider>,
        transcriber: Arc<dyn transcription::Provider>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            generator,
            transcriber,
            config: OrchestratorConfig::default(),
            cache_strategy: CacheStrategy::default(),
            cache_store: None,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// A handle whose calls are debounced on behalf of one caller, such as a
    /// meeting or a user. A scoped caller's newer, different input supersedes
    /// its own pending call and never anyone else's.
    ///
    /// The handle shares this orchestrator's cache, breakers and debounce state.
    pub fn scoped(&self, scope: impl Into<String>) -> Orchestrator {
        Orchestrator {
            scope: Some(scope.into()),
            ..self.clone()
        }
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Run an arbitrary request through the full stack.
    pub async fn execute(&self, request: OperationRequest) -> Result<Completion, Error> {
        self.entry.execute(request).await
    }

    /// Analyze meeting notes, optionally in the context of a deal stage.
    pub async fn analyze(&self, notes: &str, deal_stage: Option<&str>) -> Result<Value, Error> {
        self.structured(Operation::Analyze, [notes, deal_stage.unwrap_or_default()])
            .await
    }

    pub async fn generate_coaching(
        &self,
        transcript: &str,
        deal_stage: Option<&str>,
    ) -> Result<Value, Error> {
        self.structured(Operation::Coach, [transcript, deal_stage.unwrap_or_default()])
            .await
    }

    pub async fn generate_chat(&self, message: &str, context: Option<&str>) -> Result<String, Error> {
        self.text(Operation::Chat, [message, context.unwrap_or_default()])
            .await
    }

    pub async fn generate_methodology_insights(
        &self,
        notes: &str,
        methodology: &str,
    ) -> Result<Value, Error> {
        self.structured(Operation::Methodology, [notes, methodology])
            .await
    }

    pub async fn generate_follow_up(
        &self,
        notes: &str,
        deal_stage: Option<&str>,
    ) -> Result<Value, Error> {
        self.structured(Operation::FollowUp, [notes, deal_stage.unwrap_or_default()])
            .await
    }

    pub async fn generate_summary(&self, text: &str) -> Result<String, Error> {
        self.text(Operation::Summary, [text]).await
    }

    /// Remove filler words and fix formatting in a raw transcript.
    pub async fn cleanup_transcript(&self, transcript: &str) -> Result<String, Error> {
        self.text(Operation::Cleanup, [transcript]).await
    }

    /// Transcribe one buffered unit of audio. Never cached or debounced.
    pub async fn transcribe(&self, audio: impl Into<Arc<[u8]>>) -> Result<String, Error> {
        self.execute(OperationRequest::audio(audio))
            .await
            .map(Completion::into_text)
    }

    /// Drop cached results matching `pattern` (`*` wildcard), or all of them.
    pub async fn invalidate(&self, pattern: Option<&str>) -> usize {
        self.store.clear(pattern).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn breaker_snapshot(&self, operation: Operation) -> BreakerSnapshot {
        self.breakers.snapshot(operation)
    }

    pub fn reset_breaker(&self, operation: Operation) {
        self.breakers.reset(operation);
    }

    /// Fire every pending debounce window so no caller is left waiting.
    pub async fn shutdown(&self) {
        self.coordinator.flush_all().await;
    }

    async fn structured<const N: usize>(
        &self,
        operation: Operation,
        arguments: [&str; N],
    ) -> Result<Value, Error> {
        self.execute(self.request(operation, arguments))
            .await
            .map(Completion::into_json)
    }

    async fn text<const N: usize>(
        &self,
        operation: Operation,
        arguments: [&str; N],
    ) -> Result<String, Error> {
        self.execute(self.request(operation, arguments))
            .await
            .map(Completion::into_text)
    }

    fn request<const N: usize>(&self, operation: Operation, arguments: [&str; N]) -> OperationRequest {
        OperationRequest::text(operation, arguments).with_overrides(Overrides {
            debounce_scope: self.scope.clone(),
            ..Default::default()
        })
    }
}
