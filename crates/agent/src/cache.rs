//! Fingerprint-keyed response cache.
//!
//! Entries live for [`CACHE_TTL`]; an entry whose age has reached the TTL is
//! treated as absent and removed on the next `get`. Responses are stored as
//! JSON so a cached answer is an independent copy of the original.

use medquery_core::query::Query;
use medquery_core::response::Response;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long a resolved response stays valid.
pub const CACHE_TTL: Duration = Duration::from_secs(30 * 60);

struct CacheEntry {
    created_at: Instant,
    payload: String,
}

/// Hit and miss totals since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
}

pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn miss(&self) -> Option<Response> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Look up a live entry. Expired and undecodable entries count as misses.
    pub fn get(&self, query: &Query) -> Option<Response> {
        let key = query.fingerprint();
        let payload = {
            let mut entries = self.lock();
            let Some((expired, payload)) = entries
                .get(key)
                .map(|e| (e.created_at.elapsed() >= CACHE_TTL, e.payload.clone()))
            else {
                return self.miss();
            };
            if expired {
                entries.remove(key);
                debug!(fingerprint = key, "Cache entry expired");
                return self.miss();
            }
            payload
        };

        match serde_json::from_str::<Response>(&payload) {
            Ok(mut response) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                response.cached = true;
                Some(response)
            }
            Err(e) => {
                warn!(fingerprint = key, error = %e, "Dropping undecodable cache entry");
                self.lock().remove(key);
                self.miss()
            }
        }
    }

    /// Store a response under the query's fingerprint, replacing any previous
    /// entry. Failed or degraded responses are never stored.
    pub fn put(&self, query: &Query, response: &Response) {
        if !response.is_cacheable() {
            debug!(
                fingerprint = query.fingerprint(),
                degraded = response.degraded,
                "Response not cacheable"
            );
            return;
        }

        let payload = match serde_json::to_string(response) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Failed to serialize response for cache");
                return;
            }
        };

        self.lock().insert(
            query.fingerprint().to_string(),
            CacheEntry {
                created_at: Instant::now(),
                payload,
            },
        );
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counters(&self) -> CacheCounters {
        CacheCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::sample_response;

    fn query(text: &str) -> Query {
        Query::new(text, "fr").unwrap()
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let cache = ResponseCache::new();
        let q = query("doliprane");
        assert!(cache.get(&q).is_none());

        let response = sample_response("Doliprane 1000mg", false);
        cache.put(&q, &response);
        let hit = cache.get(&q).unwrap();
        assert!(hit.cached);
        assert_eq!(hit.trace_id(), response.trace_id());
        assert_eq!(hit.answer, response.answer);

        assert_eq!(cache.counters(), CacheCounters { hits: 1, misses: 1 });
    }

    #[tokio::test]
    async fn hits_are_idempotent() {
        let cache = ResponseCache::new();
        let q = query("Advil ?");
        cache.put(&q, &sample_response("Advil 400mg", false));

        let first = cache.get(&q).unwrap();
        let second = cache.get(&q).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn equivalent_queries_share_an_entry() {
        let cache = ResponseCache::new();
        cache.put(&query("Doliprane"), &sample_response("a", false));
        assert!(cache.get(&query("  doliprane !")).is_some());
        // A different locale is a different fingerprint
        assert!(cache.get(&Query::new("doliprane", "en").unwrap()).is_none());
    }

    #[tokio::test]
    async fn put_replaces_existing_entry() {
        let cache = ResponseCache::new();
        let q = query("doliprane");
        cache.put(&q, &sample_response("first", false));
        cache.put(&q, &sample_response("second", false));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&q).unwrap().answer, "second");
    }

    #[tokio::test]
    async fn degraded_responses_are_not_stored() {
        let cache = ResponseCache::new();
        let q = query("doliprane au lieu de aspirine");
        cache.put(&q, &sample_response("partial", true));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_exactly_at_ttl() {
        let cache = ResponseCache::new();
        let q = query("doliprane");
        cache.put(&q, &sample_response("a", false));

        tokio::time::advance(CACHE_TTL - Duration::from_secs(1)).await;
        assert!(cache.get(&q).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&q).is_none());
        // Lazily evicted
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.counters().misses, 1);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let cache = ResponseCache::new();
        cache.put(&query("doliprane"), &sample_response("a", false));
        cache.put(&query("advil"), &sample_response("b", false));
        assert_eq!(cache.clear(), 2);
        assert!(cache.get(&query("doliprane")).is_none());
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let cache = ResponseCache::new();
        let q = query("doliprane");
        cache.lock().insert(
            q.fingerprint().to_string(),
            CacheEntry {
                created_at: Instant::now(),
                payload: "{not json".into(),
            },
        );
        assert!(cache.get(&q).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let cache = std::sync::Arc::new(ResponseCache::new());
        let poisoner = cache.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.entries.lock().unwrap();
            panic!("poison the cache lock");
        })
        .join();
        assert!(cache.entries.is_poisoned());
        assert_eq!(cache.clear(), 0);
    }
}
