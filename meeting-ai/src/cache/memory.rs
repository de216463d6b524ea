//! In-process cache with TTL expiry and recency/frequency eviction.

use async_trait::async_trait;
use log::*;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{wildcard_match, CacheStats, CacheStore};

struct Entry<V> {
    value: V,
    created_at: Instant,
    expires_at: Option<Instant>,
    last_access: Instant,
    hits: u64,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Higher means more worth keeping: frequently hit, recently touched entries win.
    fn retention_score(&self, now: Instant) -> f64 {
        let idle_secs = now.saturating_duration_since(self.last_access).as_secs_f64();
        (self.hits + 1) as f64 / (1.0 + idle_secs)
    }
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    stats: CacheStats,
}

/// Bounded in-memory [`CacheStore`].
///
/// When full, expired entries are purged first; if that frees nothing, the entry
/// with the lowest combined recency/hit score is evicted.
pub struct MemoryCache<V> {
    max_size: usize,
    inner: Mutex<Inner<V>>,
}

impl<V> MemoryCache<V> {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<V>> {
        // A panic while holding the lock cannot leave the map half-updated, so
        // recovering the guard is safe.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn make_room(inner: &mut Inner<V>, max_size: usize, now: Instant) {
        if inner.entries.len() < max_size {
            return;
        }

        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before - inner.entries.len();
        inner.stats.evictions += purged as u64;

        while inner.entries.len() >= max_size {
            let victim = inner
                .entries
                .iter()
                .min_by(|(_, a), (_, b)| {
                    a.retention_score(now)
                        .partial_cmp(&b.retention_score(now))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(key, entry)| (key.clone(), now.saturating_duration_since(entry.created_at)));

            match victim {
                Some((key, age)) => {
                    trace!("Evicting cache entry {key} (age {}s)", age.as_secs());
                    inner.entries.remove(&key);
                    inner.stats.evictions += 1;
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl<V> CacheStore<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get_with_remaining(&self, key: &str) -> Option<(V, Option<Duration>)> {
        let now = Instant::now();
        let mut inner = self.lock();

        let expired = match inner.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                inner.stats.misses += 1;
                return None;
            }
        };

        if expired {
            inner.entries.remove(key);
            inner.stats.misses += 1;
            inner.stats.evictions += 1;
            return None;
        }

        inner.stats.hits += 1;
        let entry = inner.entries.get_mut(key)?;
        entry.hits += 1;
        entry.last_access = now;
        let remaining = entry
            .expires_at
            .map(|expires_at| expires_at.saturating_duration_since(now));
        Some((entry.value.clone(), remaining))
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut inner = self.lock();

        if !inner.entries.contains_key(key) {
            Self::make_room(&mut inner, self.max_size, now);
        }

        // A lifetime past what the clock can represent never expires.
        let expires_at = if ttl.is_zero() {
            None
        } else {
            now.checked_add(ttl)
        };
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                created_at: now,
                expires_at,
                last_access: now,
                hits: 0,
            },
        );
    }

    async fn delete(&self, key: &str) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    async fn clear(&self, pattern: Option<&str>) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        match pattern {
            Some(pattern) => inner
                .entries
                .retain(|key, _| !wildcard_match(pattern, key)),
            None => inner.entries.clear(),
        }
        before - inner.entries.len()
    }

    async fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.entries.get(key).map(|entry| entry.is_expired(now)) {
            Some(false) => true,
            Some(true) => {
                inner.entries.remove(key);
                inner.stats.evictions += 1;
                false
            }
            None => false,
        }
    }

    fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_get_before_and_at_expiry() {
        let cache = MemoryCache::new(10);
        cache.set("k", 1, Duration::from_secs(60)).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("k").await, Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.has("k").await);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_expires() {
        let cache = MemoryCache::new(10);
        cache.set("k", "v".to_string(), Duration::ZERO).await;

        tokio::time::advance(Duration::from_secs(60 * 60 * 24 * 365)).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_is_treated_as_no_expiry() {
        let cache = MemoryCache::new(10);
        cache.set("k", 1, Duration::from_secs(u64::MAX)).await;

        assert_eq!(cache.get_with_remaining("k").await, Some((1, None)));
        tokio::time::advance(Duration::from_secs(60 * 60 * 24 * 365)).await;
        assert!(cache.has("k").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_lifetime_counts_down() {
        let cache = MemoryCache::new(10);
        cache.set("k", 1, Duration::from_secs(60)).await;

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(
            cache.get_with_remaining("k").await,
            Some((1, Some(Duration::from_secs(15))))
        );
    }

    #[tokio::test]
    async fn test_capacity_is_never_exceeded() {
        let cache = MemoryCache::new(5);
        for i in 0..50 {
            cache.set(&format!("key-{i}"), i, Duration::from_secs(60)).await;
            assert!(cache.len() <= 5);
        }
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.stats().evictions, 45);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_prefers_cold_entries() {
        let cache = MemoryCache::new(2);
        cache.set("hot", 1, Duration::ZERO).await;
        cache.set("cold", 2, Duration::ZERO).await;

        tokio::time::advance(Duration::from_secs(10)).await;
        for _ in 0..3 {
            assert_eq!(cache.get("hot").await, Some(1));
        }

        cache.set("new", 3, Duration::ZERO).await;
        assert!(cache.has("hot").await);
        assert!(!cache.has("cold").await);
        assert!(cache.has("new").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_purged_before_live_ones() {
        let cache = MemoryCache::new(2);
        cache.set("short", 1, Duration::from_secs(1)).await;
        cache.set("long", 2, Duration::ZERO).await;

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.set("new", 3, Duration::ZERO).await;

        assert!(cache.has("long").await);
        assert!(cache.has("new").await);
        assert!(!cache.has("short").await);
    }

    #[tokio::test]
    async fn test_overwrite_at_capacity_does_not_evict() {
        let cache = MemoryCache::new(2);
        cache.set("a", 1, Duration::ZERO).await;
        cache.set("b", 2, Duration::ZERO).await;
        cache.set("a", 10, Duration::ZERO).await;

        assert_eq!(cache.get("a").await, Some(10));
        assert_eq!(cache.get("b").await, Some(2));
    }

    #[tokio::test]
    async fn test_clear_with_pattern() {
        let cache = MemoryCache::new(10);
        cache.set("analyze:1", 1, Duration::ZERO).await;
        cache.set("analyze:2", 2, Duration::ZERO).await;
        cache.set("chat:1", 3, Duration::ZERO).await;

        assert_eq!(cache.clear(Some("analyze:*")).await, 2);
        assert!(cache.has("chat:1").await);
        assert!(!cache.has("analyze:1").await);

        assert_eq!(cache.clear(None).await, 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_stats() {
        let cache = MemoryCache::new(10);
        cache.set("k", 1, Duration::ZERO).await;

        assert_eq!(cache.get("k").await, Some(1));
        assert_eq!(cache.get("missing").await, None);
        assert!(cache.delete("k").await);
        assert!(!cache.delete("k").await);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 0);
    }
}
