//! In-process storage with an optional byte quota.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{record_size, StorageBackend, StorageUsage};
use crate::error::StorageError;

/// Process-lifetime string store, the session tier.
///
/// With a quota it fails writes the way browser storage does once full.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: Mutex<HashMap<String, String>>,
    quota_bytes: Option<u64>,
}

impl MemoryStorage {
    /// Unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn used_bytes(records: &HashMap<String, String>) -> u64 {
        records.iter().map(|(k, v)| record_size(k, v)).sum()
    }
}

impl StorageBackend for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory-storage"
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn write(&self, key: &str, raw: &str) -> Result<(), StorageError> {
        let mut records = self.records.lock();

        if let Some(quota) = self.quota_bytes {
            let replaced = records.get(key).map(|old| record_size(key, old)).unwrap_or(0);
            let used = Self::used_bytes(&records) - replaced;
            let needed = record_size(key, raw);
            if used + needed > quota {
                return Err(StorageError::QuotaExceeded {
                    needed,
                    available: quota.saturating_sub(used),
                });
            }
        }

        records.insert(key.to_string(), raw.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.records.lock().remove(key);
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.records.lock().keys().cloned().collect())
    }

    fn usage(&self) -> Result<StorageUsage, StorageError> {
        let records = self.records.lock();
        Ok(StorageUsage {
            used_bytes: Self::used_bytes(&records),
            entry_count: records.len(),
            quota_bytes: self.quota_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_read_write_delete() {
        let storage = MemoryStorage::new();

        assert_ok!(storage.write("a", "1"));
        assert_eq!(storage.read("a").unwrap().as_deref(), Some("1"));

        assert_ok!(storage.delete("a"));
        assert_ok!(storage.delete("a"));
        assert!(storage.read("a").unwrap().is_none());
    }

    #[test]
    fn test_quota_rejects_write_and_keeps_old_value() {
        let storage = MemoryStorage::with_quota(10);

        assert_ok!(storage.write("k", "12345"));
        let err = assert_err!(storage.write("k", "1234567890"));
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));

        assert_eq!(storage.read("k").unwrap().as_deref(), Some("12345"));
    }

    #[test]
    fn test_quota_counts_replaced_record_once() {
        let storage = MemoryStorage::with_quota(10);

        assert_ok!(storage.write("k", "123456789"));
        assert_ok!(storage.write("k", "987654321"));
    }

    #[test]
    fn test_usage() {
        let storage = MemoryStorage::with_quota(100);
        storage.write("ab", "cde").unwrap();
        storage.write("f", "g").unwrap();

        let usage = storage.usage().unwrap();
        assert_eq!(usage.used_bytes, 7);
        assert_eq!(usage.entry_count, 2);
        assert_eq!(usage.remaining_bytes(), Some(93));
    }
}
