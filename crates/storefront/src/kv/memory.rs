//! In-process KV store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{KvError, KvStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A mutex-guarded map with per-entry expiry.
///
/// Expired entries are dropped lazily when touched. Uses the tokio clock so
/// tests can drive expiry with `tokio::time::advance`.
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryKvStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    /// Whether the store holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, KvError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let (count, expires_at) = match entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                let current: i64 = entry.value.parse().map_err(|_| KvError::NotACounter {
                    key: key.to_string(),
                })?;
                (current + 1, entry.expires_at)
            }
            _ => (1, now + ttl),
        };

        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string(),
                expires_at,
            },
        );
        Ok(count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryKvStore::new();
        store.set("verify:a@b.com", "v1", TTL).await.unwrap();
        assert_eq!(store.get("verify:a@b.com").await.unwrap().as_deref(), Some("v1"));

        store.set("verify:a@b.com", "v2", TTL).await.unwrap();
        assert_eq!(store.get("verify:a@b.com").await.unwrap().as_deref(), Some("v2"));

        store.delete("verify:a@b.com").await.unwrap();
        assert_eq!(store.get("verify:a@b.com").await.unwrap(), None);
        store.delete("verify:a@b.com").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryKvStore::new();
        store.set("pkce:s", "verifier", TTL).await.unwrap();

        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        assert!(store.get("pkce:s").await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(store.get("pkce:s").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_keeps_first_expiry() {
        let store = MemoryKvStore::new();
        assert_eq!(store.increment("attempts:x", TTL).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(store.increment("attempts:x", TTL).await.unwrap(), 2);

        // The window started at the first increment, not the second.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(store.increment("attempts:x", TTL).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_is_atomic_under_concurrency() {
        let store = MemoryKvStore::new();
        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment("attempts:c", TTL).await.unwrap() })
            })
            .collect();

        let mut seen = Vec::new();
        for task in tasks {
            seen.push(task.await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=50).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_increment_non_counter() {
        let store = MemoryKvStore::new();
        store.set("attempts:bad", "not-a-number", TTL).await.unwrap();
        let err = store.increment("attempts:bad", TTL).await.unwrap_err();
        assert!(matches!(err, KvError::NotACounter { .. }));
    }
}
