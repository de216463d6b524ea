//! Debouncing of rapid, near-duplicate text operations.
//!
//! Calls are grouped into slots by [`OperationRequest::debounce_key`]. Near-identical
//! content attaches to a pending (or in-flight) invocation in its slot and shares
//! its result.
//!
//! Materially different content is handled by whether the caller is scoped:
//!
//! - a scoped slot (one caller or meeting) holds at most one pending invocation.
//!   New content cancels the pending timer, rejects its callers with
//!   [`Error::Superseded`] and restarts the window. A timer is never left to
//!   fire twice.
//! - unrelated unscoped callers share the operation's slot, so different
//!   content there gets its own pending invocation instead of cancelling
//!   someone else's request.

use dashmap::DashMap;
use log::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::layer::Layer;
use crate::types::operation::{Completion, OperationRequest};
use crate::Error;

type Outcome = Result<Completion, Error>;
type Waiter = oneshot::Sender<Outcome>;

struct Pending {
    generation: u64,
    request: OperationRequest,
    content: String,
    waiters: Vec<Waiter>,
    timer: JoinHandle<()>,
    inner: Arc<dyn Layer>,
}

struct InFlight {
    generation: u64,
    content: String,
    waiters: Vec<Waiter>,
}

#[derive(Default)]
struct Slot {
    pending: Vec<Pending>,
    in_flight: Vec<InFlight>,
}

impl Slot {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }
}

/// Coalesces bursts of calls per debounce key into single delayed invocations.
pub struct DebounceCoordinator {
    slots: Arc<DashMap<String, Slot>>,
    similarity_threshold: f64,
    next_generation: AtomicU64,
}

impl DebounceCoordinator {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            similarity_threshold,
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    /// Number of invocations with a timer still waiting to fire.
    pub fn pending_count(&self) -> usize {
        self.slots.iter().map(|slot| slot.pending.len()).sum()
    }

    /// Schedule `request` on `inner` after `window`, coalescing with equivalent calls.
    pub async fn debounce(
        &self,
        request: OperationRequest,
        window: Duration,
        inner: Arc<dyn Layer>,
    ) -> Outcome {
        let key = request.debounce_key();
        let scoped = request.overrides.debounce_scope.is_some();
        let content = request.serialized_arguments();
        let (tx, rx) = oneshot::channel();

        {
            let mut slot = self.slots.entry(key.clone()).or_default();

            if let Some(pending) = slot
                .pending
                .iter_mut()
                .find(|pending| self.is_equivalent(&pending.content, &content))
            {
                debug!("Coalescing {key} call into pending invocation");
                pending.waiters.push(tx);
                drop(slot);
                return Self::wait(rx).await;
            }

            if scoped && !slot.pending.is_empty() {
                for stale in slot.pending.drain(..) {
                    debug!(
                        "Superseding pending {key} invocation ({} caller(s))",
                        stale.waiters.len()
                    );
                    stale.timer.abort();
                    for waiter in stale.waiters {
                        let _ = waiter.send(Err(Error::Superseded));
                    }
                }
            } else if let Some(flight) = slot
                .in_flight
                .iter_mut()
                .find(|flight| self.is_equivalent(&flight.content, &content))
            {
                debug!("Attaching {key} call to in-flight invocation");
                flight.waiters.push(tx);
                drop(slot);
                return Self::wait(rx).await;
            }

            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            let timer = self.spawn_timer(key.clone(), generation, window);
            slot.pending.push(Pending {
                generation,
                request,
                content,
                waiters: vec![tx],
                timer,
                inner,
            });
        }

        Self::wait(rx).await
    }

    /// Fire every pending invocation immediately and wait for all of them.
    ///
    /// Used on shutdown so no caller is left waiting on a timer.
    pub async fn flush_all(&self) {
        let due: Vec<(String, u64)> = self
            .slots
            .iter()
            .flat_map(|slot| {
                slot.pending
                    .iter()
                    .map(|pending| {
                        pending.timer.abort();
                        (slot.key().clone(), pending.generation)
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        if !due.is_empty() {
            info!("Flushing {} pending debounced invocation(s)", due.len());
        }

        let handles: Vec<JoinHandle<()>> = due
            .into_iter()
            .map(|(key, generation)| {
                let slots = Arc::clone(&self.slots);
                tokio::spawn(Self::fire(slots, key, generation))
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Debounced invocation task failed: {e}");
            }
        }
    }

    fn is_equivalent(&self, a: &str, b: &str) -> bool {
        similarity(a, b) >= self.similarity_threshold
    }

    fn spawn_timer(&self, key: String, generation: u64, window: Duration) -> JoinHandle<()> {
        let slots = Arc::clone(&self.slots);
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            Self::fire(slots, key, generation).await;
        })
    }

    async fn fire(slots: Arc<DashMap<String, Slot>>, key: String, generation: u64) {
        let (request, inner) = {
            let Some(mut slot) = slots.get_mut(&key) else {
                return;
            };
            // Gone when a newer window superseded this one.
            let Some(index) = slot
                .pending
                .iter()
                .position(|pending| pending.generation == generation)
            else {
                return;
            };
            let pending = slot.pending.remove(index);
            slot.in_flight.push(InFlight {
                generation,
                content: pending.content,
                waiters: pending.waiters,
            });
            (pending.request, pending.inner)
        };

        trace!("Debounce window for {key} elapsed, invoking");
        let outcome = inner.execute(request).await;

        let waiters = match slots.get_mut(&key) {
            Some(mut slot) => {
                let index = slot
                    .in_flight
                    .iter()
                    .position(|flight| flight.generation == generation);
                match index {
                    Some(index) => slot.in_flight.remove(index).waiters,
                    None => Vec::new(),
                }
            }
            None => Vec::new(),
        };
        slots.remove_if(&key, |_, slot| slot.is_idle());

        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    async fn wait(rx: oneshot::Receiver<Outcome>) -> Outcome {
        rx.await.unwrap_or(Err(Error::Cancelled))
    }
}

/// Normalized Levenshtein similarity in `[0, 1]`; `1.0` means identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    1.0 - previous[b.len()] as f64 / longest as f64
}
