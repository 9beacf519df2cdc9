//! The storage capability consumed by the cache core.
//!
//! Back-ends provide per-key atomicity for single operations plus
//! compare-and-swap semantics for updates; everything else (retry loops,
//! variant bookkeeping, invalidation ordering) lives in the store facade.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::entry::CacheEntry;
use crate::error::Result;

/// Opaque token identifying the observed generation of a stored value.
///
/// A token returned by [`Storage::get_for_update`] is only valid for one
/// subsequent [`Storage::update_cas`] against the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CasToken(u64);

impl From<u64> for CasToken {
    fn from(generation: u64) -> Self {
        Self(generation)
    }
}

impl CasToken {
    /// The raw generation number backing the token.
    pub fn generation(self) -> u64 {
        self.0
    }
}

/// A value read for update: the entry plus the token to swap against.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// The stored entry at read time
    pub entry: CacheEntry,
    /// Token for the conditional write
    pub token: CasToken,
}

/// A trait providing methods for storing, reading, and removing cache
/// entries, with compare-and-swap updates.
#[async_trait::async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Attempts to pull a stored entry.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;
    /// Stores an entry unconditionally, replacing any previous value.
    async fn put(&self, key: &str, entry: CacheEntry) -> Result<()>;
    /// Removes an entry; removing an absent key is a no-op.
    async fn remove(&self, key: &str) -> Result<()>;
    /// Bulk lookup; absent keys are simply missing from the result.
    async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, CacheEntry>>;
    /// Reads an entry together with a CAS token.
    async fn get_for_update(&self, key: &str) -> Result<Option<Snapshot>>;
    /// Conditionally replaces an entry. Returns `false` when the stored
    /// generation no longer matches the token (the caller retries).
    async fn update_cas(
        &self,
        key: &str,
        token: CasToken,
        entry: CacheEntry,
    ) -> Result<bool>;
}

#[derive(Debug, Clone)]
struct Versioned {
    generation: u64,
    entry: CacheEntry,
}

/// An in-memory [`Storage`] backend over a concurrent map.
///
/// Intended for tests and single-process use; production back-ends live
/// outside the core.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, Versioned>,
    generations: AtomicU64,
}

impl MemoryStorage {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, for inspection in tests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the backend holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|v| v.entry.clone()))
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let generation = self.next_generation();
        self.entries
            .insert(key.to_string(), Versioned { generation, entry });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, CacheEntry>> {
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(v) = self.entries.get(key) {
                out.insert(key.clone(), v.entry.clone());
            }
        }
        Ok(out)
    }

    async fn get_for_update(&self, key: &str) -> Result<Option<Snapshot>> {
        Ok(self.entries.get(key).map(|v| Snapshot {
            entry: v.entry.clone(),
            token: v.generation.into(),
        }))
    }

    async fn update_cas(
        &self,
        key: &str,
        token: CasToken,
        entry: CacheEntry,
    ) -> Result<bool> {
        let generation = self.next_generation();
        match self.entries.get_mut(key) {
            Some(mut current) if current.generation == token.generation() => {
                *current = Versioned { generation, entry };
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Resource;
    use std::time::SystemTime;

    fn entry(body: &str) -> CacheEntry {
        let now = SystemTime::now();
        CacheEntry::new(
            now,
            now,
            "GET",
            "http://example.com/".into(),
            vec![],
            200,
            vec![],
            Some(Resource::new(body.to_string())),
        )
    }

    #[tokio::test]
    async fn put_get_remove() {
        let storage = MemoryStorage::new();
        storage.put("k", entry("a")).await.unwrap();
        assert!(storage.get("k").await.unwrap().is_some());
        storage.remove("k").await.unwrap();
        assert!(storage.get("k").await.unwrap().is_none());
        // removing again is fine
        storage.remove("k").await.unwrap();
    }

    #[tokio::test]
    async fn get_many_skips_absent_keys() {
        let storage = MemoryStorage::new();
        storage.put("a", entry("a")).await.unwrap();
        storage.put("b", entry("b")).await.unwrap();
        let found = storage
            .get_many(&["a".into(), "missing".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains_key("a") && found.contains_key("b"));
    }

    #[tokio::test]
    async fn cas_detects_interleaved_writes() {
        let storage = MemoryStorage::new();
        storage.put("k", entry("v1")).await.unwrap();

        let snapshot = storage.get_for_update("k").await.unwrap().unwrap();
        // someone else replaces the value in between
        storage.put("k", entry("v2")).await.unwrap();
        assert!(!storage
            .update_cas("k", snapshot.token, entry("v3"))
            .await
            .unwrap());

        // a fresh snapshot succeeds
        let snapshot = storage.get_for_update("k").await.unwrap().unwrap();
        assert!(storage
            .update_cas("k", snapshot.token, entry("v3"))
            .await
            .unwrap());
        let stored = storage.get("k").await.unwrap().unwrap();
        assert_eq!(stored.resource.unwrap().bytes().as_ref(), b"v3");
    }

    #[tokio::test]
    async fn cas_on_removed_key_fails() {
        let storage = MemoryStorage::new();
        storage.put("k", entry("v1")).await.unwrap();
        let snapshot = storage.get_for_update("k").await.unwrap().unwrap();
        storage.remove("k").await.unwrap();
        assert!(!storage
            .update_cas("k", snapshot.token, entry("v2"))
            .await
            .unwrap());
    }
}
