//! Translation of the flat service configuration into typed AI and session settings.

use meeting_ai::resilience::{BreakerConfig, RetryPolicy};
use meeting_ai::{CacheStrategy, Operation, OrchestratorConfig};
use service::config::{CacheStrategy as ConfiguredCacheStrategy, Config};
use std::time::Duration;

use crate::transcription::SessionConfig;

/// Builds the orchestrator's per-operation policy table from `config`.
///
/// The test runtime environment turns caching, debouncing and retries off so
/// tests observe every provider call directly.
pub fn orchestrator_config(config: &Config) -> OrchestratorConfig {
    let mut orchestrator = OrchestratorConfig::default();
    orchestrator.cache_enabled = config.ai_cache_enabled;
    orchestrator.debounce_enabled = config.ai_debounce_enabled;
    orchestrator.similarity_threshold = config.debounce_similarity_threshold.clamp(0.0, 1.0);
    orchestrator.breaker = BreakerConfig {
        threshold: config.circuit_breaker_threshold,
        cooldown: Duration::from_secs(config.circuit_breaker_cooldown_secs),
    };

    for operation in Operation::ALL {
        orchestrator.update_policy(operation, |policy| {
            policy.cache_ttl = seconds(cache_ttl_secs(config, operation));
            policy.debounce_window = millis(debounce_ms(config, operation));
            policy.retry = retry_policy(config, operation);
            policy.tuning.timeout = if operation.is_audio() {
                Duration::from_secs(config.transcription_timeout_secs)
            } else {
                Duration::from_secs(config.ai_timeout_secs)
            };
        });
    }

    if config.is_test() {
        let mut passthrough = OrchestratorConfig::passthrough();
        passthrough.breaker = orchestrator.breaker;
        for operation in Operation::ALL {
            let tuning = orchestrator.policy(operation).tuning;
            passthrough.update_policy(operation, |policy| policy.tuning = tuning);
        }
        return passthrough;
    }

    orchestrator
}

pub fn cache_strategy(config: &Config) -> CacheStrategy {
    match config.ai_cache_strategy {
        ConfiguredCacheStrategy::Memory => CacheStrategy::Memory {
            max_size: config.ai_cache_max_size,
        },
        ConfiguredCacheStrategy::Hybrid => CacheStrategy::Hybrid {
            front_size: config.ai_cache_front_size.min(config.ai_cache_max_size),
            max_size: config.ai_cache_max_size,
        },
    }
}

pub fn session_config(config: &Config) -> SessionConfig {
    SessionConfig {
        flush_interval: Duration::from_millis(config.transcription_flush_interval_ms),
        flush_threshold: Duration::from_millis(config.transcription_flush_threshold_ms),
        failure_threshold: config.transcription_failure_threshold.max(1),
        backup_dir: config.transcription_backup_dir.clone(),
    }
}

fn cache_ttl_secs(config: &Config, operation: Operation) -> u64 {
    match operation {
        Operation::Analyze => config.cache_ttl_analyze_secs,
        Operation::Coach => config.cache_ttl_coach_secs,
        Operation::Chat => config.cache_ttl_chat_secs,
        Operation::Methodology => config.cache_ttl_methodology_secs,
        Operation::FollowUp => config.cache_ttl_follow_up_secs,
        Operation::Summary => config.cache_ttl_summary_secs,
        Operation::Cleanup => config.cache_ttl_cleanup_secs,
        Operation::Transcribe => 0,
    }
}

fn debounce_ms(config: &Config, operation: Operation) -> u64 {
    match operation {
        Operation::Analyze => config.debounce_analyze_ms,
        Operation::Coach => config.debounce_coach_ms,
        Operation::Chat => config.debounce_chat_ms,
        Operation::Methodology => config.debounce_methodology_ms,
        Operation::FollowUp => config.debounce_follow_up_ms,
        // Summaries and cleanup run once per meeting end; transcription is
        // time-sensitive.
        Operation::Summary | Operation::Cleanup | Operation::Transcribe => 0,
    }
}

fn retry_policy(config: &Config, operation: Operation) -> RetryPolicy {
    let max_delay = Duration::from_millis(config.retry_max_delay_ms);
    let (max_retries, base_delay, max_delay) = match operation {
        Operation::Transcribe => (
            config.transcription_max_retries,
            Duration::from_millis(500),
            max_delay.min(Duration::from_secs(4)),
        ),
        Operation::Chat => (
            config.retry_max_retries,
            Duration::from_millis(config.chat_retry_base_delay_ms),
            max_delay,
        ),
        _ => (
            config.retry_max_retries,
            Duration::from_millis(config.retry_base_delay_ms),
            max_delay,
        ),
    };

    RetryPolicy::new(max_retries)
        .with_base_delay(base_delay)
        .with_multiplier(config.retry_backoff_multiplier.max(1.0))
        .with_max_delay(max_delay)
        .with_jitter(Duration::from_millis(config.retry_jitter_ms))
}

/// Zero disables the feature for that operation.
fn seconds(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

fn millis(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_millis(value))
}
