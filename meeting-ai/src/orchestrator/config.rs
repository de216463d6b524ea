//! Per-operation tuning for the orchestrator's layers.

use std::collections::HashMap;
use std::time::Duration;

use crate::resilience::{BreakerConfig, RetryPolicy};
use crate::types::operation::{Operation, Tuning};

/// How one operation is cached, debounced, retried and tuned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationPolicy {
    /// `None` disables caching for the operation; `Some(Duration::ZERO)` caches
    /// without expiry.
    pub cache_ttl: Option<Duration>,
    /// `None` disables debouncing for the operation.
    pub debounce_window: Option<Duration>,
    pub retry: RetryPolicy,
    pub tuning: Tuning,
}

impl OperationPolicy {
    /// Built-in defaults: analysis results are stable for a given input so they are
    /// cached for minutes; chat is debounced least; transcription is never cached
    /// or debounced and retries at most twice.
    pub fn default_for(operation: Operation) -> Self {
        let minutes = |m: u64| Some(Duration::from_secs(m * 60));
        let millis = |ms: u64| Some(Duration::from_millis(ms));
        let retry = |max_retries: u32, base_ms: u64| {
            RetryPolicy::new(max_retries).with_base_delay(Duration::from_millis(base_ms))
        };
        let tuning =
            |temperature: f32, max_tokens: u32, timeout_secs: u64| {
                Tuning::new(temperature, max_tokens, Duration::from_secs(timeout_secs))
            };

        match operation {
            Operation::Analyze => Self {
                cache_ttl: minutes(30),
                debounce_window: millis(2_000),
                retry: retry(3, 2_000),
                tuning: tuning(0.3, 2_000, 60),
            },
            Operation::Coach => Self {
                cache_ttl: minutes(15),
                debounce_window: millis(1_500),
                retry: retry(3, 1_000),
                tuning: tuning(0.7, 1_000, 30),
            },
            Operation::Chat => Self {
                cache_ttl: minutes(5),
                debounce_window: millis(500),
                retry: retry(2, 500),
                tuning: tuning(0.7, 800, 20),
            },
            Operation::Methodology => Self {
                cache_ttl: minutes(60),
                debounce_window: millis(2_000),
                retry: retry(3, 2_000),
                tuning: tuning(0.3, 1_500, 60),
            },
            Operation::FollowUp => Self {
                cache_ttl: minutes(15),
                debounce_window: millis(1_000),
                retry: retry(3, 1_000),
                tuning: tuning(0.6, 600, 30),
            },
            Operation::Summary => Self {
                cache_ttl: minutes(30),
                debounce_window: None,
                retry: retry(3, 2_000),
                tuning: tuning(0.3, 1_000, 60),
            },
            Operation::Transcribe => Self {
                cache_ttl: None,
                debounce_window: None,
                retry: retry(2, 500).with_max_delay(Duration::from_secs(4)),
                tuning: tuning(0.0, 0, 15),
            },
            Operation::Cleanup => Self {
                cache_ttl: minutes(60),
                debounce_window: None,
                retry: retry(2, 1_000),
                tuning: tuning(0.2, 4_000, 60),
            },
        }
    }
}

/// Orchestrator-wide settings plus the per-operation policy table.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub cache_enabled: bool,
    pub debounce_enabled: bool,
    /// Similarity at or above which debounced calls are treated as unchanged.
    pub similarity_threshold: f64,
    pub breaker: BreakerConfig,
    policies: HashMap<Operation, OperationPolicy>,
}

impl OrchestratorConfig {
    /// Caching, debouncing and retries all off; every call goes straight through
    /// the breaker to the provider. Intended for tests.
    pub fn passthrough() -> Self {
        let mut config = Self {
            cache_enabled: false,
            debounce_enabled: false,
            ..Self::default()
        };
        for operation in Operation::ALL {
            config.update_policy(operation, |policy| policy.retry = RetryPolicy::none());
        }
        config
    }

    pub fn policy(&self, operation: Operation) -> OperationPolicy {
        self.policies
            .get(&operation)
            .copied()
            .unwrap_or_else(|| OperationPolicy::default_for(operation))
    }

    pub fn with_policy(mut self, operation: Operation, policy: OperationPolicy) -> Self {
        self.policies.insert(operation, policy);
        self
    }

    pub fn update_policy(&mut self, operation: Operation, update: impl FnOnce(&mut OperationPolicy)) {
        let mut policy = self.policy(operation);
        update(&mut policy);
        self.policies.insert(operation, policy);
    }

    /// Effective cache TTL for `operation`, accounting for the global switch.
    pub fn cache_ttl(&self, operation: Operation) -> Option<Duration> {
        if !self.cache_enabled || operation.is_audio() {
            return None;
        }
        self.policy(operation).cache_ttl
    }

    /// Effective debounce window for `operation`, accounting for the global switch.
    pub fn debounce_window(&self, operation: Operation) -> Option<Duration> {
        if !self.debounce_enabled || operation.is_audio() {
            return None;
        }
        self.policy(operation).debounce_window
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            debounce_enabled: true,
            similarity_threshold: 0.95,
            breaker: BreakerConfig::default(),
            policies: Operation::ALL
                .into_iter()
                .map(|operation| (operation, OperationPolicy::default_for(operation)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcription_is_never_cached_or_debounced() {
        let mut config = OrchestratorConfig::default();
        config.update_policy(Operation::Transcribe, |policy| {
            policy.cache_ttl = Some(Duration::from_secs(60));
            policy.debounce_window = Some(Duration::from_secs(1));
        });
        assert_eq!(config.cache_ttl(Operation::Transcribe), None);
        assert_eq!(config.debounce_window(Operation::Transcribe), None);
    }

    #[test]
    fn test_default_tuning_relationships() {
        let analyze = OperationPolicy::default_for(Operation::Analyze);
        let chat = OperationPolicy::default_for(Operation::Chat);
        let transcribe = OperationPolicy::default_for(Operation::Transcribe);

        assert!(analyze.retry.base_delay > chat.retry.base_delay);
        assert!(chat.debounce_window < analyze.debounce_window);
        assert_eq!(transcribe.retry.max_retries, 2);
    }

    #[test]
    fn test_global_switches() {
        let config = OrchestratorConfig {
            cache_enabled: false,
            debounce_enabled: false,
            ..Default::default()
        };
        assert_eq!(config.cache_ttl(Operation::Analyze), None);
        assert_eq!(config.debounce_window(Operation::Analyze), None);
        assert_eq!(
            config.policy(Operation::Analyze).cache_ttl,
            Some(Duration::from_secs(30 * 60))
        );
    }

    #[test]
    fn test_passthrough_disables_retries() {
        let config = OrchestratorConfig::passthrough();
        for operation in Operation::ALL {
            assert_eq!(config.policy(operation).retry.max_retries, 0);
        }
    }
}
