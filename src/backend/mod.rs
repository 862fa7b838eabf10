//! Storage Backends
//!
//! Raw string key/value stores the cache writes encoded records into.
//!
//! # Backends
//! - `Memory`: the in-process fast-path mirror, owned by the cache itself
//! - `Session`: a quota-bounded store that lives as long as the process ([`MemoryStorage`])
//! - `Durable`: a quota-bounded store that survives restarts ([`FileStorage`])

mod file;
mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub use file::FileStorage;
pub use memory::MemoryStorage;

// == Backend Selector ==
/// Which tier a cache operation targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Session,
    #[default]
    Durable,
}

impl Backend {
    /// Backends holding encoded records.
    pub const PERSISTENT: [Backend; 2] = [Backend::Session, Backend::Durable];

    pub const ALL: [Backend; 3] = [Backend::Memory, Backend::Session, Backend::Durable];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::Session => "session",
            Backend::Durable => "durable",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Usage ==
/// Space accounting for a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    /// Bytes currently stored (keys plus values)
    pub used_bytes: u64,
    /// Number of records stored
    pub entry_count: usize,
    /// Total capacity, None when unbounded
    pub quota_bytes: Option<u64>,
}

impl StorageUsage {
    /// Headroom before writes start failing, None when unbounded.
    pub fn remaining_bytes(&self) -> Option<u64> {
        self.quota_bytes
            .map(|quota| quota.saturating_sub(self.used_bytes))
    }
}

// == Storage Backend Trait ==
/// A raw key/value store.
///
/// Implementations use interior mutability so one instance can be shared
/// between the cache, its sweep task and the application.
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `raw` under `key`, replacing any previous record.
    ///
    /// A failed write must leave the previous record intact.
    fn write(&self, key: &str, raw: &str) -> Result<(), StorageError>;

    /// Deletes `key`. Deleting an absent key succeeds.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    fn list_keys(&self) -> Result<Vec<String>, StorageError>;

    fn usage(&self) -> Result<StorageUsage, StorageError>;
}

/// Bytes a record occupies for quota purposes.
pub(crate) fn record_size(key: &str, raw: &str) -> u64 {
    (key.len() + raw.len()) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backend_is_durable() {
        assert_eq!(Backend::default(), Backend::Durable);
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(Backend::Session.to_string(), "session");
        assert_eq!(
            serde_json::to_string(&Backend::Memory).unwrap(),
            "\"memory\""
        );
    }

    #[test]
    fn test_remaining_bytes() {
        let usage = StorageUsage {
            used_bytes: 70,
            entry_count: 2,
            quota_bytes: Some(100),
        };
        assert_eq!(usage.remaining_bytes(), Some(30));

        let unbounded = StorageUsage::default();
        assert_eq!(unbounded.remaining_bytes(), None);
    }
}
