//! Cache Entry Module
//!
//! Defines the unit of storage and when it counts as live.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;

// == Cache Entry ==
/// A single cached value with its expiry metadata.
///
/// Entries are immutable: an update is a new entry with a new `created_at`.
/// `expires_at` is always `created_at + ttl_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    key: String,
    value: Value,
    created_at: u64,
    ttl_ms: u64,
    expires_at: u64,
    size_bytes: usize,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry written at `now`.
    ///
    /// # Arguments
    /// * `key` - Cache key (without registry prefix)
    /// * `value` - JSON payload
    /// * `ttl_ms` - Requested lifetime in milliseconds
    /// * `now` - Write time in Unix milliseconds
    pub fn new(key: impl Into<String>, value: Value, ttl_ms: u64, now: u64) -> Self {
        let size_bytes = value.to_string().len();
        Self {
            key: key.into(),
            value,
            created_at: now,
            ttl_ms,
            expires_at: now.saturating_add(ttl_ms),
            size_bytes,
        }
    }

    // == Is Live ==
    /// Checks whether the entry may still be served.
    ///
    /// Boundary condition: at `now == expires_at` the entry is already expired.
    pub fn is_live(&self, now: u64) -> bool {
        now < self.expires_at
    }

    // == Time To Live ==
    /// Remaining lifetime in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }

    /// Rejects entries whose expiry was not derived from their write time.
    pub(crate) fn validate(&self) -> Result<(), CodecError> {
        if self.expires_at != self.created_at.saturating_add(self.ttl_ms) {
            return Err(CodecError::Inconsistent(format!(
                "expires_at {} != created_at {} + ttl_ms {}",
                self.expires_at, self.created_at, self.ttl_ms
            )));
        }
        Ok(())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}
