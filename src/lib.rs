//! Tabcache - A client-side TTL cache
//!
//! Key/value caching with expiry over an in-memory fast path and pluggable
//! session/durable storage, with compression, obfuscation, periodic sweeping
//! and stale-while-revalidate reads.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use backend::{Backend, FileStorage, MemoryStorage, StorageBackend, StorageUsage};
pub use cache::{Cache, CacheEntry, CacheEvent, GetOptions, RefreshOptions, SetOptions};
pub use config::CacheConfig;
pub use error::{CacheError, StorageError};
pub use tasks::spawn_sweep_task;
