//! Cache Store Module
//!
//! The cache contract callers use: get/set/remove/clear over the memory,
//! session and durable tiers, plus batch helpers, usage accounting,
//! sweeping and the sweep lifecycle.
//!
//! Nothing here returns an error across the bool/Option surface: failures are
//! logged and degrade to a miss or a `false`. The `try_*` variants expose them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{Backend, FileStorage, MemoryStorage, StorageBackend, StorageUsage};
use crate::cache::events::EventBus;
use crate::cache::{
    CacheEntry, CacheEvent, CacheStats, Clock, Codec, MemoryMirror, SweepReport, SystemClock,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, CodecError, Result, StorageError};
use crate::tasks::spawn_sweep_task;

// == Options ==
/// Per-call options of a write.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Lifetime override, the configured default when None
    pub ttl_ms: Option<u64>,
    pub backend: Backend,
    /// Compression override, the configured default when None
    pub compress: Option<bool>,
    /// Obfuscation override, the configured default when None
    pub obfuscate: Option<bool>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }

    pub fn obfuscate(mut self, obfuscate: bool) -> Self {
        self.obfuscate = Some(obfuscate);
        self
    }
}

/// Per-call options of a read.
#[derive(Debug, Clone)]
pub struct GetOptions {
    pub backend: Backend,
    /// Whether a live mirrored copy may answer without reading the backend
    pub fallback_to_memory: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            fallback_to_memory: true,
        }
    }
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn fallback_to_memory(mut self, fallback: bool) -> Self {
        self.fallback_to_memory = fallback;
        self
    }
}

impl From<Backend> for GetOptions {
    fn from(backend: Backend) -> Self {
        Self::new().backend(backend)
    }
}

impl From<Backend> for SetOptions {
    fn from(backend: Backend) -> Self {
        Self::new().backend(backend)
    }
}

/// Why a record was dropped by a read path.
#[derive(Debug, Clone, Copy)]
enum Discard {
    Expired,
    Corrupted,
}

// == Cache ==
/// TTL cache layered over a memory mirror and two persistent backends.
///
/// Construct one per application and share it behind an `Arc`.
pub struct Cache {
    config: CacheConfig,
    codec: Codec,
    clock: Arc<dyn Clock>,
    session: Arc<dyn StorageBackend>,
    durable: Arc<dyn StorageBackend>,
    mirror: Mutex<MemoryMirror>,
    stats: Mutex<CacheStats>,
    events: EventBus,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Cache {
    // == Constructors ==
    /// Creates a cache over the given session and durable backends.
    pub fn new(
        config: CacheConfig,
        session: Arc<dyn StorageBackend>,
        durable: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            codec: Codec::new(config.compress_threshold),
            config,
            clock: Arc::new(SystemClock),
            session,
            durable,
            mirror: Mutex::new(MemoryMirror::new()),
            stats: Mutex::new(CacheStats::new()),
            events: EventBus::new(),
            sweeper: Mutex::new(None),
        }
    }

    /// Creates a cache whose tiers all live in process memory.
    pub fn in_memory(config: CacheConfig) -> Self {
        let quota = config.quota_bytes;
        Self::new(
            config,
            Arc::new(MemoryStorage::with_quota(quota)),
            Arc::new(MemoryStorage::with_quota(quota)),
        )
    }

    /// Creates a cache whose durable tier lives in `config.cache_dir`.
    pub fn open(config: CacheConfig) -> std::result::Result<Self, StorageError> {
        let quota = config.quota_bytes;
        let durable = FileStorage::open(&config.cache_dir, Some(quota))?;
        info!("Durable cache opened at {}", durable.dir().display());
        Ok(Self::new(
            config,
            Arc::new(MemoryStorage::with_quota(quota)),
            Arc::new(durable),
        ))
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn storage(&self, backend: Backend) -> Option<&Arc<dyn StorageBackend>> {
        match backend {
            Backend::Memory => None,
            Backend::Session => Some(&self.session),
            Backend::Durable => Some(&self.durable),
        }
    }

    /// Backend key under which `key` is registered.
    pub fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    fn cache_key<'a>(&self, storage_key: &'a str) -> Option<&'a str> {
        storage_key.strip_prefix(self.config.key_prefix.as_str())
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// Returns false if the value cannot be serialized or the backend refuses
    /// the write; nothing is written in either case.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, opts: SetOptions) -> bool {
        match self.try_set(key, value, &opts) {
            Ok(()) => true,
            Err(e) => {
                warn!("Cache set failed for '{}' ({}): {}", key, opts.backend, e);
                false
            }
        }
    }

    /// Like [`Cache::set`], returning the failure.
    pub fn try_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        opts: &SetOptions,
    ) -> Result<()> {
        let result = serde_json::to_value(value)
            .map_err(CacheError::from)
            .and_then(|value| self.write_entry(key, value, opts));

        if result.is_err() {
            self.stats.lock().record_write_failure();
        }
        result
    }

    fn write_entry(&self, key: &str, value: Value, opts: &SetOptions) -> Result<()> {
        let ttl_ms = opts.ttl_ms.unwrap_or(self.config.default_ttl_ms);
        let entry = CacheEntry::new(key, value, ttl_ms, self.clock.now_ms());

        if let Some(storage) = self.storage(opts.backend) {
            let raw = self
                .codec
                .encode(
                    &entry,
                    opts.compress.unwrap_or(self.config.compress),
                    opts.obfuscate.unwrap_or(self.config.obfuscate),
                )
                .map_err(CacheError::Encode)?;

            storage
                .write(&self.storage_key(key), &raw)
                .map_err(|source| CacheError::BackendWrite {
                    key: key.to_string(),
                    source,
                })?;
        }

        debug!(
            "Cached '{}' in {} backend ({} bytes, ttl {}ms)",
            key,
            opts.backend,
            entry.size_bytes(),
            ttl_ms
        );

        self.mirror.lock().insert(opts.backend, entry);
        self.stats.lock().record_write();
        self.events.publish(CacheEvent::Set {
            backend: opts.backend,
            key: key.to_string(),
        });
        Ok(())
    }

    // == Get ==
    /// Returns the live value under `key` as `T`, or None.
    ///
    /// A stored value that does not deserialize into `T` is reported as a miss
    /// but left in place.
    pub fn get<T: DeserializeOwned>(&self, key: &str, opts: impl Into<GetOptions>) -> Option<T> {
        let value = self.get_value(key, opts)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                debug!("Cached '{}' has an unexpected shape: {}", key, e);
                None
            }
        }
    }

    /// Returns the live JSON value under `key`, or None.
    pub fn get_value(&self, key: &str, opts: impl Into<GetOptions>) -> Option<Value> {
        self.get_entry(key, &opts.into())
            .map(CacheEntry::into_value)
    }

    /// Returns the live entry under `key`, or None.
    pub fn get_entry(&self, key: &str, opts: &GetOptions) -> Option<CacheEntry> {
        let now = self.clock.now_ms();

        if opts.fallback_to_memory || opts.backend == Backend::Memory {
            let mirrored = self.mirror.lock().get(opts.backend, key).cloned();
            match mirrored {
                Some(entry) if entry.is_live(now) => {
                    self.stats.lock().record_hit(true);
                    return Some(entry);
                }
                Some(_) => {
                    self.mirror.lock().remove(opts.backend, key);
                    if opts.backend == Backend::Memory {
                        self.note_discard(Backend::Memory, key, Discard::Expired);
                    }
                }
                None => {}
            }
        }

        let Some(storage) = self.storage(opts.backend) else {
            self.stats.lock().record_miss();
            return None;
        };

        match self.read_live(storage.as_ref(), opts.backend, key, now) {
            Ok(Some(entry)) => {
                self.mirror.lock().insert(opts.backend, entry.clone());
                self.stats.lock().record_hit(false);
                Some(entry)
            }
            Ok(None) => {
                self.stats.lock().record_miss();
                None
            }
            Err(e) => {
                match &e {
                    CacheError::Expired(_) => debug!("Cache miss for '{}': {}", key, e),
                    CacheError::Decode(_) => {}
                    _ => warn!("Cache read failed for '{}' ({}): {}", key, opts.backend, e),
                }
                self.stats.lock().record_miss();
                None
            }
        }
    }

    /// Reads and decodes a registered record, dropping it if expired or corrupted.
    fn read_live(
        &self,
        storage: &dyn StorageBackend,
        backend: Backend,
        key: &str,
        now: u64,
    ) -> Result<Option<CacheEntry>> {
        let storage_key = self.storage_key(key);
        let Some(raw) = storage.read(&storage_key)? else {
            return Ok(None);
        };

        let decoded = self.codec.decode(&raw).and_then(|entry| {
            if entry.key() == key {
                Ok(entry)
            } else {
                Err(CodecError::Inconsistent(format!(
                    "record for '{}' stored under '{}'",
                    entry.key(),
                    key
                )))
            }
        });

        let entry = match decoded {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    "Dropping corrupted record '{}' from {} backend: {}",
                    key, backend, e
                );
                self.discard(storage, backend, key, &storage_key, Discard::Corrupted);
                return Err(CacheError::Decode(e));
            }
        };

        if !entry.is_live(now) {
            self.discard(storage, backend, key, &storage_key, Discard::Expired);
            return Err(CacheError::Expired(key.to_string()));
        }

        Ok(Some(entry))
    }

    fn discard(
        &self,
        storage: &dyn StorageBackend,
        backend: Backend,
        key: &str,
        storage_key: &str,
        reason: Discard,
    ) {
        if let Err(e) = storage.delete(storage_key) {
            warn!(
                "Failed to delete '{}' from {} backend ({}): {}",
                key,
                backend,
                storage.name(),
                e
            );
        }
        self.mirror.lock().remove(backend, key);
        self.note_discard(backend, key, reason);
    }

    fn note_discard(&self, backend: Backend, key: &str, reason: Discard) {
        {
            let mut stats = self.stats.lock();
            match reason {
                Discard::Expired => stats.record_expired(1),
                Discard::Corrupted => stats.record_corrupted(),
            }
        }
        self.events.publish(CacheEvent::Evicted {
            backend,
            key: key.to_string(),
        });
    }

    // == Remove ==
    /// Removes `key` from `backend` and from the memory mirror.
    ///
    /// Removing an absent key succeeds. Returns false only if the backend
    /// delete itself failed.
    pub fn remove(&self, key: &str, backend: Backend) -> bool {
        let mut existed = self.mirror.lock().remove(backend, key).is_some();

        if let Some(storage) = self.storage(backend) {
            let storage_key = self.storage_key(key);
            existed |= matches!(storage.read(&storage_key), Ok(Some(_)));
            if let Err(e) = storage.delete(&storage_key) {
                warn!("Cache remove failed for '{}' ({}): {}", key, backend, e);
                return false;
            }
        }

        if existed {
            debug!("Removed '{}' from {} backend", key, backend);
            self.events.publish(CacheEvent::Removed {
                backend,
                key: key.to_string(),
            });
        }
        true
    }

    // == Clear ==
    /// Deletes every registered key from `backend`, or from all backends when None.
    ///
    /// Keys outside the registry prefix are left alone. Returns the number of
    /// entries removed.
    pub fn clear(&self, backend: Option<Backend>) -> usize {
        let targets: Vec<Backend> = match backend {
            Some(b) => vec![b],
            None => Backend::ALL.to_vec(),
        };

        let mut removed = 0;
        for target in targets {
            let mirrored = self.mirror.lock().clear(target);

            match self.storage(target) {
                Some(storage) => {
                    for storage_key in self.registered_keys(storage.as_ref(), target) {
                        match storage.delete(&storage_key) {
                            Ok(()) => removed += 1,
                            Err(e) => warn!(
                                "Cache clear failed for '{}' ({}, {}): {}",
                                storage_key,
                                target,
                                storage.name(),
                                e
                            ),
                        }
                    }
                }
                None => removed += mirrored,
            }

            info!("Cleared {} backend", target);
            self.events.publish(CacheEvent::Cleared { backend: target });
        }
        removed
    }

    /// Registered backend keys of `storage`, logging listing failures.
    fn registered_keys(&self, storage: &dyn StorageBackend, backend: Backend) -> Vec<String> {
        match storage.list_keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|k| self.cache_key(k).is_some())
                .collect(),
            Err(e) => {
                warn!(
                    "Failed to list keys of {} backend ({}): {}",
                    backend,
                    storage.name(),
                    e
                );
                Vec::new()
            }
        }
    }

    // == Batch API ==
    /// Registered keys of `backend`, including expired ones not yet swept.
    pub fn keys(&self, backend: Backend) -> Vec<String> {
        match self.storage(backend) {
            Some(storage) => self
                .registered_keys(storage.as_ref(), backend)
                .iter()
                .filter_map(|k| self.cache_key(k).map(str::to_string))
                .collect(),
            None => self.mirror.lock().keys(Backend::Memory),
        }
    }

    /// Whether a live entry exists under `key`.
    pub fn contains(&self, key: &str, opts: impl Into<GetOptions>) -> bool {
        self.get_entry(key, &opts.into()).is_some()
    }

    /// Writes every item with the same options, returning how many succeeded.
    pub fn set_many<I, K, T>(&self, items: I, opts: SetOptions) -> usize
    where
        I: IntoIterator<Item = (K, T)>,
        K: AsRef<str>,
        T: Serialize,
    {
        items
            .into_iter()
            .filter(|(key, value)| self.set(key.as_ref(), value, opts.clone()))
            .count()
    }

    /// Reads several keys, returning the hits.
    pub fn get_many<I, K, T>(&self, keys: I, opts: impl Into<GetOptions>) -> HashMap<String, T>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
        T: DeserializeOwned,
    {
        let opts = opts.into();
        keys.into_iter()
            .filter_map(|key| {
                let key = key.as_ref();
                self.get::<T>(key, opts.clone()).map(|v| (key.to_string(), v))
            })
            .collect()
    }

    /// Removes several keys; true if every removal succeeded.
    pub fn remove_many<I, K>(&self, keys: I, backend: Backend) -> bool
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter()
            .fold(true, |ok, key| self.remove(key.as_ref(), backend) && ok)
    }

    /// Removes every key of `backend` starting with `prefix`.
    pub fn remove_prefix(&self, backend: Backend, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .keys(backend)
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect();

        keys.iter()
            .filter(|key| self.remove(key, backend))
            .count()
    }

    // == Usage ==
    /// Space used by `backend` and, where bounded, the headroom left.
    pub fn usage(&self, backend: Backend) -> Option<StorageUsage> {
        match self.storage(backend) {
            Some(storage) => match storage.usage() {
                Ok(usage) => Some(usage),
                Err(e) => {
                    warn!(
                        "Failed to read usage of {} backend ({}): {}",
                        backend,
                        storage.name(),
                        e
                    );
                    None
                }
            },
            None => Some(self.mirror.lock().usage()),
        }
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.lock().clone();
        stats.mirrored_entries = self.mirror.lock().len();
        stats
    }

    // == Events ==
    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    // == Sweep ==
    /// Deletes every expired or undecodable registered record.
    ///
    /// A key that cannot be processed is counted in `errors` and skipped.
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now_ms();
        let mut report = SweepReport::default();

        for backend in Backend::PERSISTENT {
            let Some(storage) = self.storage(backend) else {
                continue;
            };

            let keys = match storage.list_keys() {
                Ok(keys) => keys,
                Err(e) => {
                    warn!(
                        "Sweep could not list {} backend ({}): {}",
                        backend,
                        storage.name(),
                        e
                    );
                    report.errors += 1;
                    continue;
                }
            };

            for storage_key in &keys {
                let Some(key) = self.cache_key(storage_key) else {
                    continue;
                };
                report.scanned += 1;

                match self.read_live(storage.as_ref(), backend, key, now) {
                    Ok(_) => {}
                    Err(CacheError::Expired(_)) => report.expired += 1,
                    Err(CacheError::Decode(_)) => report.corrupted += 1,
                    Err(e) => {
                        warn!(
                            "Sweep skipped '{}' ({}, {}): {}",
                            key,
                            backend,
                            storage.name(),
                            e
                        );
                        report.errors += 1;
                    }
                }
            }
        }

        let purged = self.mirror.lock().purge_expired(now);
        for (backend, key) in &purged {
            self.note_discard(*backend, key, Discard::Expired);
        }
        report.expired += purged.len();

        debug!(
            "Sweep scanned {} records: {} expired, {} corrupted, {} errors",
            report.scanned, report.expired, report.corrupted, report.errors
        );
        report
    }

    // == Lifecycle ==
    /// Starts the periodic sweep on the current tokio runtime.
    ///
    /// Returns false when no runtime is available. Starting twice is a no-op.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut sweeper = self.sweeper.lock();
        if sweeper.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return true;
        }

        if tokio::runtime::Handle::try_current().is_err() {
            warn!("Cache sweep not started: no tokio runtime");
            return false;
        }

        *sweeper = Some(spawn_sweep_task(
            Arc::downgrade(self),
            self.config.sweep_interval,
        ));
        true
    }

    /// Stops the periodic sweep. Returns whether one was running.
    pub fn stop(&self) -> bool {
        match self.sweeper.lock().take() {
            Some(handle) => {
                handle.abort();
                info!("Cache sweep stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}
