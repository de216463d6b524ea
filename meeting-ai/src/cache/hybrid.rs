//! Two-tier cache: a small in-memory front over a larger or remote backing store.

use async_trait::async_trait;
use log::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{CacheStats, CacheStore, MemoryCache};

/// [`CacheStore`] that reads through a [`MemoryCache`] front tier to `back`.
///
/// Back-tier hits are promoted into the front tier for at most `promote_ttl`,
/// and never for longer than the back-tier entry has left to live. Writes,
/// deletes and clears go to both tiers.
pub struct HybridCache<V> {
    front: MemoryCache<V>,
    back: Arc<dyn CacheStore<V>>,
    promote_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> HybridCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(front_size: usize, back: Arc<dyn CacheStore<V>>, promote_ttl: Duration) -> Self {
        Self {
            front: MemoryCache::new(front_size),
            back,
            promote_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Front-tier lifetime for an entry that expires after `remaining`
    /// (`None` for never).
    fn front_ttl(&self, remaining: Option<Duration>) -> Duration {
        match remaining {
            None => self.promote_ttl,
            Some(remaining) if self.promote_ttl.is_zero() => remaining,
            Some(remaining) => remaining.min(self.promote_ttl),
        }
    }
}

#[async_trait]
impl<V> CacheStore<V> for HybridCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get_with_remaining(&self, key: &str) -> Option<(V, Option<Duration>)> {
        if let Some(hit) = self.front.get_with_remaining(key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(hit);
        }

        match self.back.get_with_remaining(key).await {
            Some((value, remaining)) => {
                trace!("Promoting cache entry {key} to front tier");
                self.front
                    .set(key, value.clone(), self.front_ttl(remaining))
                    .await;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some((value, remaining))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) {
        let remaining = (!ttl.is_zero()).then_some(ttl);
        self.front
            .set(key, value.clone(), self.front_ttl(remaining))
            .await;
        self.back.set(key, value, ttl).await;
    }

    async fn delete(&self, key: &str) -> bool {
        let front = self.front.delete(key).await;
        let back = self.back.delete(key).await;
        front || back
    }

    async fn clear(&self, pattern: Option<&str>) -> usize {
        self.front.clear(pattern).await;
        self.back.clear(pattern).await
    }

    async fn has(&self, key: &str) -> bool {
        self.front.has(key).await || self.back.has(key).await
    }

    fn stats(&self) -> CacheStats {
        let back = self.back.stats();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.front.stats().evictions + back.evictions,
            entries: back.entries,
        }
    }
}
