//! Error types for the cache
//!
//! Provides unified error handling using thiserror. None of these cross the
//! bool/Option surface of [`crate::cache::Cache`]; they are returned by the
//! `try_*` operations and logged by the rest.

use thiserror::Error;

// == Storage Error Enum ==
/// Failures raised by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Writing the record would exceed the backend quota
    #[error("Quota exceeded: need {needed} bytes, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },

    /// Underlying filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// == Codec Error Enum ==
/// Failures raised while decoding a stored record.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Envelope or entry JSON is malformed
    #[error("Malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Record written by an incompatible pipeline
    #[error("Unsupported record version: {0}")]
    Version(u32),

    /// Payload is not valid base64
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Payload could not be inflated or is not valid UTF-8
    #[error("Invalid payload: {0}")]
    Payload(String),

    /// Entry fields are inconsistent (expires_at not derived from created_at + ttl_ms)
    #[error("Inconsistent entry: {0}")]
    Inconsistent(String),
}

// == Cache Error Enum ==
/// Unified error type for cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Value cannot be turned into JSON
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend refused the write
    #[error("Backend write failed for {key}: {source}")]
    BackendWrite {
        key: String,
        #[source]
        source: StorageError,
    },

    /// Entry could not be turned into a record
    #[error("Encode failed: {0}")]
    Encode(#[source] CodecError),

    /// Stored record is corrupted or foreign
    #[error("Decode failed: {0}")]
    Decode(#[from] CodecError),

    /// Entry exists but is past its expiry
    #[error("Key expired: {0}")]
    Expired(String),

    /// Fetcher of a stale-while-revalidate call failed
    #[error("Fetch failed for {key}: {message}")]
    Fetch { key: String, message: String },

    /// Backend failed outside of a write (read, delete, listing)
    #[error("Backend error: {0}")]
    Backend(#[from] StorageError),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
