//! Cache store capability and the in-memory adapter.
//!
//! A store either supports tag-scoped eviction or it does not; the choice is
//! made when the store is constructed and probed through
//! [`CacheStore::tags`]. Store failures are reported as [`StoreError`] and
//! are never folded into "tags unsupported".

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use super::config::CacheConfig;
use super::keys::{CacheKey, RecordSetTag};
use super::lock::{rw_read, rw_write};
use super::registry::TagIndex;

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_EVICT_TOTAL: &str = "cached_pagination_evict_total";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend timed out")]
    Timeout,
    #[error("cache entry could not be encoded or decoded: {0}")]
    Codec(String),
}

impl StoreError {
    pub fn codec(err: impl std::fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Tag-scoped view of a cache store.
///
/// Entries are opaque bytes; callers own the encoding.
#[async_trait]
pub trait TaggedCache: Send + Sync {
    /// Fetch a fresh entry stored under `key` with `tag`.
    async fn get(&self, tag: &RecordSetTag, key: &CacheKey) -> Result<Option<Bytes>, StoreError>;

    /// Store `value` under `key`, grouped under `tag`, expiring after `ttl`.
    /// Readers observe either the previous state or the complete new value.
    async fn put(
        &self,
        tag: &RecordSetTag,
        key: &CacheKey,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Remove every entry under `tag` in one operation.
    async fn flush(&self, tag: &RecordSetTag) -> Result<bool, StoreError>;
}

/// Capability probe over a cache backend.
pub trait CacheStore: Send + Sync {
    /// The tag-scoped interface, or `None` when the backend cannot evict by tag.
    fn tags(&self) -> Option<&dyn TaggedCache>;

    fn supports_tags(&self) -> bool {
        self.tags().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tagging {
    Enabled,
    Disabled,
}

struct Entry {
    tag: RecordSetTag,
    value: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct Inner {
    entries: LruCache<CacheKey, Entry>,
    index: TagIndex,
}

/// In-process LRU store with per-entry TTL.
///
/// Entries and the tag index share one lock, so a flush removes every entry
/// under a tag before any reader can observe the store again.
pub struct MemoryStore {
    tagging: Tagging,
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Store with tag-scoped eviction.
    pub fn tagged(config: &CacheConfig) -> Self {
        Self::with_tagging(config, Tagging::Enabled)
    }

    /// Store that reports no tag support, standing in for backends (plain
    /// key-value caches) that cannot evict by tag.
    pub fn untagged(config: &CacheConfig) -> Self {
        Self::with_tagging(config, Tagging::Disabled)
    }

    fn with_tagging(config: &CacheConfig, tagging: Tagging) -> Self {
        Self {
            tagging,
            inner: RwLock::new(Inner {
                entries: LruCache::new(config.capacity_non_zero()),
                index: TagIndex::new(),
            }),
        }
    }

    /// Whether a fresh entry exists under `key`, without touching recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        rw_read(&self.inner, SOURCE, "contains")
            .entries
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Number of stored entries, including expired ones not yet reaped.
    pub fn len(&self) -> usize {
        rw_read(&self.inner, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys currently indexed under `tag`.
    pub fn keys_for(&self, tag: &RecordSetTag) -> usize {
        rw_read(&self.inner, SOURCE, "keys_for").index.keys_for(tag)
    }

    /// Drop every entry regardless of tag.
    pub fn clear(&self) {
        let mut inner = rw_write(&self.inner, SOURCE, "clear");
        inner.entries.clear();
        inner.index.clear();
    }
}

impl CacheStore for MemoryStore {
    fn tags(&self) -> Option<&dyn TaggedCache> {
        match self.tagging {
            Tagging::Enabled => Some(self),
            Tagging::Disabled => None,
        }
    }
}

#[async_trait]
impl TaggedCache for MemoryStore {
    async fn get(&self, tag: &RecordSetTag, key: &CacheKey) -> Result<Option<Bytes>, StoreError> {
        let now = Instant::now();
        let mut guard = rw_write(&self.inner, SOURCE, "get");
        let inner = &mut *guard;

        let expired = match inner.entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.tag != *tag => return Ok(None),
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
        };

        if expired {
            inner.entries.pop(key);
            inner.index.unregister(key);
            debug!(cache_key = %key, tag = %tag, "Expired cached page reaped");
        }
        Ok(None)
    }

    async fn put(
        &self,
        tag: &RecordSetTag,
        key: &CacheKey,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let entry = Entry {
            tag: tag.clone(),
            value,
            expires_at: Instant::now() + ttl,
        };

        let mut guard = rw_write(&self.inner, SOURCE, "put");
        let inner = &mut *guard;

        if let Some((evicted_key, _)) = inner.entries.push(key.clone(), entry) {
            if evicted_key != *key {
                inner.index.unregister(&evicted_key);
                counter!(METRIC_EVICT_TOTAL).increment(1);
                debug!(cache_key = %evicted_key, "Cached page evicted for capacity");
            }
        }
        inner.index.register(tag, key);
        Ok(())
    }

    async fn flush(&self, tag: &RecordSetTag) -> Result<bool, StoreError> {
        let mut guard = rw_write(&self.inner, SOURCE, "flush");
        let inner = &mut *guard;

        let keys = inner.index.take(tag);
        for key in &keys {
            inner.entries.pop(key);
        }
        debug!(tag = %tag, removed = keys.len(), "Tag flushed from page store");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::num::{NonZeroU32, NonZeroU64};
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::application::pagination::{Fields, PaginationDescriptor};
    use crate::cache::keys::{page_key, tag_for};
    use crate::domain::query::LogicalQuery;

    fn key(record_set: &str, page: u64) -> CacheKey {
        let query = LogicalQuery::new("select * from items", vec![]).expect("query");
        let pagination = PaginationDescriptor::offset(
            NonZeroU32::new(10).expect("size"),
            "page",
            NonZeroU64::new(page).expect("page"),
        );
        page_key(&query, record_set, &pagination, &Fields::all())
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn put_then_get_returns_value() {
        let store = MemoryStore::tagged(&CacheConfig::default());
        let tag = tag_for("items");

        assert!(store.get(&tag, &key("items", 1)).await.unwrap().is_none());

        store
            .put(&tag, &key("items", 1), Bytes::from("page-1"), HOUR)
            .await
            .unwrap();

        let cached = store.get(&tag, &key("items", 1)).await.unwrap();
        assert_eq!(cached, Some(Bytes::from("page-1")));
    }

    #[tokio::test]
    async fn get_under_another_tag_misses() {
        let store = MemoryStore::tagged(&CacheConfig::default());
        store
            .put(&tag_for("items"), &key("items", 1), Bytes::from("v"), HOUR)
            .await
            .unwrap();

        let other = store.get(&tag_for("orders"), &key("items", 1)).await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn flush_removes_only_the_tagged_entries() {
        let store = MemoryStore::tagged(&CacheConfig::default());
        let items = tag_for("items");
        let orders = tag_for("orders");

        store.put(&items, &key("items", 1), Bytes::from("a"), HOUR).await.unwrap();
        store.put(&items, &key("items", 2), Bytes::from("b"), HOUR).await.unwrap();
        store.put(&orders, &key("orders", 1), Bytes::from("c"), HOUR).await.unwrap();

        assert!(store.flush(&items).await.unwrap());

        assert!(!store.contains(&key("items", 1)));
        assert!(!store.contains(&key("items", 2)));
        assert!(store.contains(&key("orders", 1)));
        assert_eq!(store.keys_for(&items), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::tagged(&CacheConfig::default());
        let tag = tag_for("items");
        store
            .put(&tag, &key("items", 1), Bytes::from("v"), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get(&tag, &key("items", 1)).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get(&tag, &key("items", 1)).await.unwrap().is_none());
        assert_eq!(store.keys_for(&tag), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn lru_eviction_unregisters_the_evicted_key() {
        let config = CacheConfig {
            capacity: 2,
            ..Default::default()
        };
        let store = MemoryStore::tagged(&config);
        let tag = tag_for("items");

        store.put(&tag, &key("items", 1), Bytes::from("1"), HOUR).await.unwrap();
        store.put(&tag, &key("items", 2), Bytes::from("2"), HOUR).await.unwrap();
        store.put(&tag, &key("items", 3), Bytes::from("3"), HOUR).await.unwrap();

        assert!(!store.contains(&key("items", 1)));
        assert!(store.contains(&key("items", 3)));
        assert_eq!(store.keys_for(&tag), 2);
    }

    #[tokio::test]
    async fn overwriting_a_key_keeps_one_index_entry() {
        let store = MemoryStore::tagged(&CacheConfig::default());
        let tag = tag_for("items");
        store.put(&tag, &key("items", 1), Bytes::from("old"), HOUR).await.unwrap();
        store.put(&tag, &key("items", 1), Bytes::from("new"), HOUR).await.unwrap();

        assert_eq!(store.keys_for(&tag), 1);
        assert_eq!(
            store.get(&tag, &key("items", 1)).await.unwrap(),
            Some(Bytes::from("new"))
        );
    }

    #[test]
    fn capability_is_fixed_at_construction() {
        let config = CacheConfig::default();
        assert!(MemoryStore::tagged(&config).supports_tags());
        assert!(!MemoryStore::untagged(&config).supports_tags());
        assert!(MemoryStore::untagged(&config).tags().is_none());
    }

    #[tokio::test]
    async fn store_recovers_from_poisoned_lock() {
        let store = MemoryStore::tagged(&CacheConfig::default());

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store.inner.write().expect("store lock should be acquired");
            panic!("poison store lock");
        }));

        let tag = tag_for("items");
        store.put(&tag, &key("items", 1), Bytes::from("v"), HOUR).await.unwrap();
        assert!(store.contains(&key("items", 1)));
    }
}
