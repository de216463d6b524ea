//! Per-operation circuit breakers.

use dashmap::DashMap;
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::operation::Operation;
use crate::Error;

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Trip threshold and cool-down shared by every breaker in a registry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker. Zero disables tripping.
    pub threshold: u32,
    /// Time an open breaker waits before admitting a probe call.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<Instant>,
    pub next_retry_at: Option<Instant>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    next_retry_at: Option<Instant>,
    probe_in_flight: bool,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            next_retry_at: None,
            probe_in_flight: false,
        }
    }
}

/// One circuit breaker per [`Operation`], created lazily on first use.
///
/// Every state change happens inside a single map guard with no await in
/// between, so concurrent callers never observe a half-applied transition.
/// While half-open, exactly one probe call is admitted; other callers fail fast
/// until the probe settles.
#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    breakers: Arc<DashMap<Operation, BreakerState>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> BreakerConfig {
        self.config
    }

    /// Ask permission to make one call for `operation`.
    ///
    /// Returns [`Error::CircuitOpen`] without side effects when the breaker is open
    /// and the cool-down has not elapsed, or when a half-open probe is already out.
    pub fn acquire(&self, operation: Operation) -> Result<Permit, Error> {
        let now = Instant::now();
        let mut breaker = self.breakers.entry(operation).or_default();

        match breaker.state {
            CircuitState::Closed => Ok(self.permit(operation, false)),
            CircuitState::Open => {
                let next_retry_at = breaker.next_retry_at.unwrap_or(now);
                if now >= next_retry_at {
                    info!("Circuit for {operation} half-open, admitting probe call");
                    breaker.state = CircuitState::HalfOpen;
                    breaker.probe_in_flight = true;
                    Ok(self.permit(operation, true))
                } else {
                    Err(Error::CircuitOpen {
                        operation,
                        retry_after: next_retry_at - now,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if breaker.probe_in_flight {
                    Err(Error::CircuitOpen {
                        operation,
                        retry_after: Duration::ZERO,
                    })
                } else {
                    breaker.probe_in_flight = true;
                    Ok(self.permit(operation, true))
                }
            }
        }
    }

    pub fn snapshot(&self, operation: Operation) -> BreakerSnapshot {
        match self.breakers.get(&operation) {
            Some(breaker) => BreakerSnapshot {
                state: breaker.state,
                consecutive_failures: breaker.consecutive_failures,
                last_failure_at: breaker.last_failure_at,
                next_retry_at: breaker.next_retry_at,
            },
            None => BreakerSnapshot {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                next_retry_at: None,
            },
        }
    }

    /// Force `operation`'s breaker back to closed with a zeroed failure count.
    pub fn reset(&self, operation: Operation) {
        if self.breakers.remove(&operation).is_some() {
            info!("Circuit for {operation} manually reset");
        }
    }

    pub fn reset_all(&self) {
        self.breakers.clear();
    }

    fn permit(&self, operation: Operation, probe: bool) -> Permit {
        Permit {
            registry: self.clone(),
            operation,
            probe,
            settled: false,
        }
    }

    fn record_success(&self, operation: Operation) {
        let mut breaker = self.breakers.entry(operation).or_default();
        if breaker.state != CircuitState::Closed {
            info!("Circuit for {operation} closed after successful call");
        }
        *breaker = BreakerState::default();
    }

    fn record_failure(&self, operation: Operation) {
        let now = Instant::now();
        let mut breaker = self.breakers.entry(operation).or_default();
        breaker.consecutive_failures += 1;
        breaker.last_failure_at = Some(now);
        breaker.probe_in_flight = false;

        match breaker.state {
            CircuitState::HalfOpen => {
                warn!("Probe call for {operation} failed, circuit re-opened");
                breaker.state = CircuitState::Open;
                breaker.next_retry_at = Some(now + self.config.cooldown);
            }
            CircuitState::Closed
                if self.config.threshold > 0
                    && breaker.consecutive_failures >= self.config.threshold =>
            {
                warn!(
                    "Circuit for {operation} opened after {} consecutive failures",
                    breaker.consecutive_failures
                );
                breaker.state = CircuitState::Open;
                breaker.next_retry_at = Some(now + self.config.cooldown);
            }
            _ => {}
        }
    }

    fn release_probe(&self, operation: Operation) {
        if let Some(mut breaker) = self.breakers.get_mut(&operation) {
            breaker.probe_in_flight = false;
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

/// Permission for one outbound call. Report its outcome with
/// [`Permit::success`] or [`Permit::failure`]; dropping an unsettled probe
/// permit frees the half-open slot without counting a result.
pub struct Permit {
    registry: CircuitBreakerRegistry,
    operation: Operation,
    probe: bool,
    settled: bool,
}

impl Permit {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.registry.record_success(self.operation);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.registry.record_failure(self.operation);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.registry.release_probe(self.operation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(threshold: u32, cooldown_secs: u64) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(BreakerConfig {
            threshold,
            cooldown: Duration::from_secs(cooldown_secs),
        })
    }

    fn fail(registry: &CircuitBreakerRegistry, operation: Operation) {
        registry.acquire(operation).unwrap().failure();
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_after_threshold_consecutive_failures() {
        let breakers = registry(3, 30);

        fail(&breakers, Operation::Analyze);
        fail(&breakers, Operation::Analyze);
        assert_eq!(breakers.snapshot(Operation::Analyze).state, CircuitState::Closed);

        fail(&breakers, Operation::Analyze);
        let snapshot = breakers.snapshot(Operation::Analyze);
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.consecutive_failures, 3);

        match breakers.acquire(Operation::Analyze) {
            Err(Error::CircuitOpen {
                operation,
                retry_after,
            }) => {
                assert_eq!(operation, Operation::Analyze);
                assert_eq!(retry_after, Duration::from_secs(30));
            }
            other => panic!("expected CircuitOpen, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_breakers_are_independent_per_operation() {
        let breakers = registry(1, 30);
        fail(&breakers, Operation::Chat);

        assert!(breakers.acquire(Operation::Chat).is_err());
        assert!(breakers.acquire(Operation::Analyze).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let breakers = registry(3, 30);
        fail(&breakers, Operation::Coach);
        fail(&breakers, Operation::Coach);
        breakers.acquire(Operation::Coach).unwrap().success();
        fail(&breakers, Operation::Coach);

        let snapshot = breakers.snapshot(Operation::Coach);
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_success_closes() {
        let breakers = registry(2, 10);
        fail(&breakers, Operation::Summary);
        fail(&breakers, Operation::Summary);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(breakers.acquire(Operation::Summary).is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        let probe = breakers.acquire(Operation::Summary).unwrap();
        assert!(probe.is_probe());
        assert_eq!(breakers.snapshot(Operation::Summary).state, CircuitState::HalfOpen);

        probe.success();
        let snapshot = breakers.snapshot(Operation::Summary);
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_probe() {
        let breakers = registry(1, 5);
        fail(&breakers, Operation::Chat);
        tokio::time::advance(Duration::from_secs(5)).await;

        let probe = breakers.acquire(Operation::Chat).unwrap();
        assert!(matches!(
            breakers.acquire(Operation::Chat),
            Err(Error::CircuitOpen { .. })
        ));

        // Abandoning the probe frees the slot for the next caller.
        drop(probe);
        assert!(breakers.acquire(Operation::Chat).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_new_cooldown() {
        let breakers = registry(1, 5);
        fail(&breakers, Operation::Methodology);
        tokio::time::advance(Duration::from_secs(5)).await;

        breakers.acquire(Operation::Methodology).unwrap().failure();
        let snapshot = breakers.snapshot(Operation::Methodology);
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(
            snapshot.next_retry_at,
            Some(Instant::now() + Duration::from_secs(5))
        );
        assert!(breakers.acquire(Operation::Methodology).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_threshold_never_trips() {
        let breakers = registry(0, 5);
        for _ in 0..20 {
            fail(&breakers, Operation::Transcribe);
        }
        assert!(breakers.acquire(Operation::Transcribe).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reset() {
        let breakers = registry(1, 60);
        fail(&breakers, Operation::FollowUp);
        assert!(breakers.acquire(Operation::FollowUp).is_err());

        breakers.reset(Operation::FollowUp);
        assert!(breakers.acquire(Operation::FollowUp).is_ok());
        assert_eq!(
            breakers.snapshot(Operation::FollowUp).consecutive_failures,
            0
        );
    }
}
