//! Memory Mirror Module
//!
//! In-process fast path holding decoded entries, keyed by the backend they
//! were written to so tiers stay isolated from each other.

use std::collections::HashMap;

use crate::backend::{Backend, StorageUsage};
use crate::cache::CacheEntry;

// == Memory Mirror ==
/// Decoded entries by (origin backend, key).
#[derive(Debug, Default)]
pub struct MemoryMirror {
    entries: HashMap<(Backend, String), CacheEntry>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `key` written to `backend`, if any.
    pub fn get(&self, backend: Backend, key: &str) -> Option<&CacheEntry> {
        self.entries.get(&(backend, key.to_string()))
    }

    pub fn insert(&mut self, backend: Backend, entry: CacheEntry) {
        self.entries
            .insert((backend, entry.key().to_string()), entry);
    }

    pub fn remove(&mut self, backend: Backend, key: &str) -> Option<CacheEntry> {
        self.entries.remove(&(backend, key.to_string()))
    }

    // == Keys ==
    /// Keys mirrored for `backend`.
    pub fn keys(&self, backend: Backend) -> Vec<String> {
        self.entries
            .keys()
            .filter(|(b, _)| *b == backend)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Drops every entry mirrored for `backend`, returning how many were removed.
    pub fn clear(&mut self, backend: Backend) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(b, _), _| *b != backend);
        before - self.entries.len()
    }

    // == Purge Expired ==
    /// Removes entries that are no longer live at `now`.
    ///
    /// Returns the removed (backend, key) pairs.
    pub fn purge_expired(&mut self, now: u64) -> Vec<(Backend, String)> {
        let expired: Vec<(Backend, String)> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            self.entries.remove(id);
        }
        expired
    }

    /// Space used by entries of the memory backend proper.
    pub fn usage(&self) -> StorageUsage {
        let (used_bytes, entry_count) = self
            .entries
            .iter()
            .filter(|((b, _), _)| *b == Backend::Memory)
            .fold((0u64, 0usize), |(bytes, count), ((_, key), entry)| {
                (bytes + (key.len() + entry.size_bytes()) as u64, count + 1)
            });

        StorageUsage {
            used_bytes,
            entry_count,
            quota_bytes: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
