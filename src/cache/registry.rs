//! Bidirectional tag index.
//!
//! Tracks which cache keys belong to which record set tag so a flush can
//! remove exactly those entries. The index holds no lock of its own; the
//! owning store keeps it under the same lock as its entries, which makes a
//! flush a single critical section.

use std::collections::{HashMap, HashSet};

use super::keys::{CacheKey, RecordSetTag};

#[derive(Debug, Default)]
pub struct TagIndex {
    tag_to_keys: HashMap<RecordSetTag, HashSet<CacheKey>>,
    key_to_tag: HashMap<CacheKey, RecordSetTag>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` under `tag`, moving it if it was registered elsewhere.
    pub fn register(&mut self, tag: &RecordSetTag, key: &CacheKey) {
        if self.key_to_tag.get(key) == Some(tag) {
            return;
        }
        self.unregister(key);
        self.tag_to_keys
            .entry(tag.clone())
            .or_default()
            .insert(key.clone());
        self.key_to_tag.insert(key.clone(), tag.clone());
    }

    /// Forget `key`, dropping its tag entry once empty.
    pub fn unregister(&mut self, key: &CacheKey) {
        let Some(tag) = self.key_to_tag.remove(key) else {
            return;
        };
        if let Some(keys) = self.tag_to_keys.get_mut(&tag) {
            keys.remove(key);
            if keys.is_empty() {
                self.tag_to_keys.remove(&tag);
            }
        }
    }

    /// Remove every key under `tag` and return them.
    pub fn take(&mut self, tag: &RecordSetTag) -> HashSet<CacheKey> {
        let keys = self.tag_to_keys.remove(tag).unwrap_or_default();
        for key in &keys {
            self.key_to_tag.remove(key);
        }
        keys
    }

    pub fn tag_of(&self, key: &CacheKey) -> Option<&RecordSetTag> {
        self.key_to_tag.get(key)
    }

    pub fn keys_for(&self, tag: &RecordSetTag) -> usize {
        self.tag_to_keys.get(tag).map_or(0, HashSet::len)
    }

    pub fn clear(&mut self) {
        self.tag_to_keys.clear();
        self.key_to_tag.clear();
    }

    pub fn tag_count(&self) -> usize {
        self.tag_to_keys.len()
    }

    pub fn key_count(&self) -> usize {
        self.key_to_tag.len()
    }
}
