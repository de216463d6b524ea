//! Key/value stores with TTL used by the orchestrator's cache layer.
//!
//! Reads never return an entry at or past its expiry. Absent reads are normal
//! and carry no error.

mod hybrid;
mod memory;

pub use hybrid::HybridCache;
pub use memory::MemoryCache;

use async_trait::async_trait;
use std::time::Duration;

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// Pluggable cache backing.
///
/// A `ttl` of zero means the entry never expires.
#[async_trait]
pub trait CacheStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        self.get_with_remaining(key).await.map(|(value, _)| value)
    }

    /// Like [`CacheStore::get`], also returning how long the entry has left to
    /// live (`None` when it never expires).
    async fn get_with_remaining(&self, key: &str) -> Option<(V, Option<Duration>)>;

    async fn set(&self, key: &str, value: V, ttl: Duration);

    /// Returns whether an entry was removed.
    async fn delete(&self, key: &str) -> bool;

    /// Remove every key matching `pattern` (`*` is a wildcard), or everything when
    /// `pattern` is `None`. Returns the number of removed entries.
    async fn clear(&self, pattern: Option<&str>) -> usize;

    async fn has(&self, key: &str) -> bool;

    fn stats(&self) -> CacheStats;
}

/// Match `key` against a pattern in which `*` matches any run of characters.
pub(crate) fn wildcard_match(pattern: &str, key: &str) -> bool {
    let pattern = pattern.as_bytes();
    let key = key.as_bytes();
    let (mut p, mut k) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while k < key.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            p += 1;
            resume = k;
        } else if p < pattern.len() && pattern[p] == key[k] {
            p += 1;
            k += 1;
        } else if let Some(star_at) = star {
            p = star_at + 1;
            resume += 1;
            k = resume;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}
