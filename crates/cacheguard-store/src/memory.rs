//! In-process store backend
//!
//! Keeps keys in insertion-ordered slots so scans behave like a Redis
//! cursor walk: each call visits up to `count` slots, and keys that stay
//! present for the whole walk are returned exactly once even when other
//! keys are deleted between calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::backend::{CacheStore, MemoryReport, ScanBatch, ScanCursor, SweepLock};
use crate::error::StoreError;
use crate::pattern::KeyPattern;

/// Call counters, mostly useful to assert what a sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub memory_info_calls: u64,
    pub scan_calls: u64,
    pub delete_calls: u64,
    pub keys_deleted: u64,
}

struct Entry {
    slot: u64,
    value: Vec<u8>,
}

struct Lease {
    token: String,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    slots: BTreeMap<u64, String>,
    next_slot: u64,
    data_bytes: u64,
    baseline_bytes: u64,
    max_bytes: u64,
    leases: HashMap<String, Lease>,
    stats: StoreStats,
}

/// In-memory key-value store
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store with the given memory ceiling (0 = none)
    pub fn new(max_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_slot: 1,
                max_bytes,
                ..Default::default()
            }),
        }
    }

    /// Account for memory not owned by keys (allocator overhead, other tenants)
    pub fn with_baseline(self, bytes: u64) -> Self {
        self.inner.lock().baseline_bytes = bytes;
        self
    }

    pub fn set_baseline(&self, bytes: u64) {
        self.inner.lock().baseline_bytes = bytes;
    }

    pub fn set_max_bytes(&self, max_bytes: u64) {
        self.inner.lock().max_bytes = max_bytes;
    }

    /// Insert or overwrite a key
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        let value = value.into();
        let mut inner = self.inner.lock();

        let added = (key.len() + value.len()) as u64;
        if let Some(entry) = inner.entries.get_mut(&key) {
            let removed = (key.len() + entry.value.len()) as u64;
            entry.value = value;
            inner.data_bytes = inner.data_bytes - removed + added;
            return;
        }

        let slot = inner.next_slot;
        inner.next_slot += 1;
        inner.slots.insert(slot, key.clone());
        inner.entries.insert(key, Entry { slot, value });
        inner.data_bytes += added;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        self.inner.lock().stats
    }

    pub fn reset_stats(&self) {
        self.inner.lock().stats = StoreStats::default();
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn memory_info(&self) -> Result<MemoryReport, StoreError> {
        let mut inner = self.inner.lock();
        inner.stats.memory_info_calls += 1;
        Ok(MemoryReport::new(
            inner.baseline_bytes + inner.data_bytes,
            inner.max_bytes,
        ))
    }

    async fn scan_keys(
        &self,
        cursor: ScanCursor,
        pattern: &str,
        count: usize,
    ) -> Result<ScanBatch, StoreError> {
        let pattern = KeyPattern::parse(pattern)?;
        let mut inner = self.inner.lock();
        inner.stats.scan_calls += 1;

        let mut visited = inner.slots.range(cursor.value()..);
        let keys: Vec<String> = visited
            .by_ref()
            .take(count.max(1))
            .filter(|(_, key)| pattern.is_match(key))
            .map(|(_, key)| key.clone())
            .collect();
        let next = visited
            .next()
            .map(|(slot, _)| ScanCursor::new(*slot))
            .unwrap_or(ScanCursor::START);

        debug!("Scanned from cursor {} -> {} ({} keys)", cursor, next, keys.len());
        Ok(ScanBatch { cursor: next, keys })
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        inner.stats.delete_calls += 1;

        let mut deleted = 0u64;
        for key in keys {
            if let Some(entry) = inner.entries.remove(key) {
                inner.slots.remove(&entry.slot);
                inner.data_bytes -= (key.len() + entry.value.len()) as u64;
                deleted += 1;
            }
        }

        inner.stats.keys_deleted += deleted;
        Ok(deleted)
    }
}

#[async_trait]
impl SweepLock for MemoryStore {
    async fn try_acquire(
        &self,
        name: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if let Some(lease) = inner.leases.get(name)
            && lease.expires_at > now
        {
            return Ok(false);
        }

        inner.leases.insert(
            name.to_string(),
            Lease {
                token: token.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release(&self, name: &str, token: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        match inner.leases.get(name) {
            Some(lease) if lease.token == token => {
                inner.leases.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(count: usize) -> MemoryStore {
        let store = MemoryStore::new(0);
        for i in 0..count {
            store.insert(format!("cache:{}", i), "v");
        }
        store
    }

    #[tokio::test]
    async fn test_scan_walks_every_slot_once() {
        let store = filled(25);
        let mut cursor = ScanCursor::START;
        let mut seen = Vec::new();
        let mut calls = 0;

        loop {
            let batch = store.scan_keys(cursor, "cache:*", 10).await.unwrap();
            calls += 1;
            seen.extend(batch.keys.iter().cloned());
            cursor = batch.cursor;
            if cursor.is_start() {
                break;
            }
        }

        assert_eq!(calls, 3);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 25);
    }

    #[tokio::test]
    async fn test_scan_survives_deletes_between_calls() {
        let store = filled(20);

        let first = store.scan_keys(ScanCursor::START, "cache:*", 10).await.unwrap();
        assert_eq!(store.delete_keys(&first.keys).await.unwrap(), 10);

        let second = store.scan_keys(first.cursor, "cache:*", 10).await.unwrap();
        assert_eq!(second.keys.len(), 10);
        assert!(second.is_last());
        assert!(second.keys.iter().all(|k| !first.keys.contains(k)));
    }

    #[tokio::test]
    async fn test_scan_filters_by_pattern() {
        let store = filled(3);
        store.insert("session:abc", "token");

        let batch = store.scan_keys(ScanCursor::START, "session:*", 100).await.unwrap();
        assert_eq!(batch.keys, vec!["session:abc".to_string()]);
        assert!(batch.is_last());
    }

    #[tokio::test]
    async fn test_delete_missing_keys_is_not_an_error() {
        let store = filled(1);
        let deleted = store
            .delete_keys(&["cache:0".to_string(), "cache:missing".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.delete_keys(&[]).await.unwrap(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_memory_report_tracks_contents() {
        let store = MemoryStore::new(1000).with_baseline(100);
        store.insert("cache:a", "12345");
        let report = store.memory_info().await.unwrap();
        assert_eq!(report.used_bytes, 100 + 7 + 5);
        assert_eq!(report.max_bytes, 1000);

        store.insert("cache:a", "1");
        let report = store.memory_info().await.unwrap();
        assert_eq!(report.used_bytes, 100 + 7 + 1);

        store.delete_keys(&["cache:a".to_string()]).await.unwrap();
        let report = store.memory_info().await.unwrap();
        assert_eq!(report.used_bytes, 100);
    }

    #[tokio::test]
    async fn test_lease_is_exclusive_until_released() {
        let store = MemoryStore::new(0);
        let ttl = Duration::from_secs(30);

        assert!(store.try_acquire("sweep", "a", ttl).await.unwrap());
        assert!(!store.try_acquire("sweep", "b", ttl).await.unwrap());

        // Only the owner can release
        assert!(!store.release("sweep", "b").await.unwrap());
        assert!(store.release("sweep", "a").await.unwrap());

        assert!(store.try_acquire("sweep", "b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken() {
        let store = MemoryStore::new(0);
        assert!(store.try_acquire("sweep", "a", Duration::ZERO).await.unwrap());
        assert!(store.try_acquire("sweep", "b", Duration::from_secs(30)).await.unwrap());
    }
}
