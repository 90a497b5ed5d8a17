use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};

/// Entry stored in the map with an expiry timestamp.
#[derive(Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// TTL cache for collaborator query results.
///
/// Capacity-unbounded; entries are checked on read and evicted lazily. The
/// identity-service decorator keys this by query signature and calls
/// [`TtlCache::invalidate_all`] whenever group membership is mutated, so a
/// listing can never outlive the membership change that falsifies it by
/// more than the read that was already in flight.
pub struct TtlCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(entry) = self.entries.get(key) {
            if Instant::now() < entry.expires_at {
                return serde_json::from_str(&entry.value).ok();
            }
            // expired — drop the ref before removing
            drop(entry);
            self.entries.remove(key);
        }
        None
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) {
        let Ok(json) = serde_json::to_string(value) else {
            return;
        };
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: json,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every entry, valid or not.
    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    /// Remove all expired entries. Callers may run this periodically to
    /// bound memory; reads never return expired values either way.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.put("k", &vec!["a".to_string(), "b".to_string()]);
        let got: Vec<String> = cache.get("k").unwrap();
        assert_eq!(got, vec!["a", "b"]);
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = TtlCache::new(Duration::from_millis(5));
        cache.put("k", &1u32);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get::<u32>("k"), None);
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.put("a", &1u32);
        cache.put("b", &2u32);
        cache.invalidate_all();
        assert!(cache.is_empty());
        assert_eq!(cache.get::<u32>("a"), None);
    }

    #[test]
    fn evict_expired_reports_removed_count() {
        let cache = TtlCache::new(Duration::from_millis(5));
        cache.put("a", &1u32);
        cache.put("b", &2u32);
        std::thread::sleep(Duration::from_millis(20));
        cache.put("c", &3u32);
        // c is still fresh only if its TTL has not lapsed; with a 5ms TTL it
        // may have expired too, so only assert the stale pair went away.
        let removed = cache.evict_expired();
        assert!(removed >= 2);
        assert!(cache.len() <= 1);
    }

    #[test]
    fn missing_key_is_none() {
        let cache = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get::<u32>("nope"), None);
    }
}
