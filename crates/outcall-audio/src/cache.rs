//! Bounded, time-expiring cache of pre-encoded µ-law phrases.
//!
//! Short acknowledgements ("I totally understand.") recur constantly in
//! sales calls; caching their encoded audio removes a full synthesis
//! round trip from the latency budget. Keys are normalized text so
//! punctuation and casing variants share an entry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Texts at or above this length are never cached.
const MAX_CACHEABLE_LEN: usize = 100;

/// Default entry capacity; the oldest entry is evicted beyond this.
const DEFAULT_CAPACITY: usize = 50;

/// Default entry lifetime.
const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

struct CacheEntry {
    audio: Arc<Vec<u8>>,
    created_at: Instant,
}

/// Process-global phrase cache. Cheap to clone the stored audio: readers
/// get an `Arc` snapshot of an immutable buffer.
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl ResponseCache {
    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
            ttl,
        }
    }

    /// Normalizes text to its cache key: trim, lowercase, strip
    /// punctuation, collapse runs of whitespace.
    pub fn normalize_key(text: &str) -> String {
        let stripped: String = text
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_ascii_punctuation())
            .collect();
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Looks up the audio for a phrase. Expired entries behave as misses.
    pub fn get(&self, text: &str) -> Option<Arc<Vec<u8>>> {
        let key = Self::normalize_key(text);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(&key)?;
        if entry.created_at.elapsed() > self.ttl {
            return None;
        }
        Some(Arc::clone(&entry.audio))
    }

    /// Stores the audio for a phrase. Returns `false` (and stores nothing)
    /// for texts too long to cache.
    pub fn insert(&self, text: &str, audio: Vec<u8>) -> bool {
        if text.len() >= MAX_CACHEABLE_LEN {
            return false;
        }
        let key = Self::normalize_key(text);
        if key.is_empty() {
            return false;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key,
            CacheEntry {
                audio: Arc::new(audio),
                created_at: Instant::now(),
            },
        );

        // Drop expired entries first, then the oldest until within capacity.
        let ttl = self.ttl;
        entries.retain(|_, e| e.created_at.elapsed() <= ttl);
        while entries.len() > self.capacity {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            } else {
                break;
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_merges_variants() {
        assert_eq!(
            ResponseCache::normalize_key("  Could you give me 30 seconds?  "),
            "could you give me 30 seconds"
        );
        assert_eq!(
            ResponseCache::normalize_key("I totally understand."),
            ResponseCache::normalize_key("i totally UNDERSTAND")
        );
    }

    #[test]
    fn hit_returns_identical_bytes() {
        let cache = ResponseCache::default();
        assert!(cache.insert("I totally understand.", vec![1, 2, 3]));
        let hit = cache.get("i totally understand").unwrap();
        assert_eq!(*hit, vec![1, 2, 3]);
    }

    #[test]
    fn long_text_is_not_cached() {
        let cache = ResponseCache::default();
        let long = "x".repeat(100);
        assert!(!cache.insert(&long, vec![0]));
        assert!(cache.get(&long).is_none());

        let just_under = "y".repeat(99);
        assert!(cache.insert(&just_under, vec![0]));
    }

    #[test]
    fn capacity_evicts_oldest_created() {
        let cache = ResponseCache::with_limits(3, Duration::from_secs(3600));
        cache.insert("one", vec![1]);
        std::thread::sleep(Duration::from_millis(5));
        cache.insert("two", vec![2]);
        std::thread::sleep(Duration::from_millis(5));
        cache.insert("three", vec![3]);
        std::thread::sleep(Duration::from_millis(5));
        cache.insert("four", vec![4]);

        assert_eq!(cache.len(), 3);
        assert!(cache.get("one").is_none(), "oldest entry should be evicted");
        assert!(cache.get("two").is_some());
        assert!(cache.get("four").is_some());
    }

    #[test]
    fn expired_entries_miss() {
        let cache = ResponseCache::with_limits(10, Duration::from_millis(10));
        cache.insert("hello", vec![9]);
        assert!(cache.get("hello").is_some());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("hello").is_none());
    }

    #[test]
    fn whitespace_only_text_is_rejected() {
        let cache = ResponseCache::default();
        assert!(!cache.insert("   ", vec![1]));
        assert!(cache.is_empty());
    }
}
