//! Stale-While-Revalidate
//!
//! Serve what the cache has right away and refresh it from the source of
//! truth in the background.
//!
//! Overlapping refreshes of one key are not coordinated: whichever fetch
//! finishes last wins.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::cache::{Cache, GetOptions, SetOptions};
use crate::error::CacheError;

/// Options of a [`Cache::get_or_refresh`] call.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Lifetime of the refreshed value, the configured default when None
    pub ttl_ms: Option<u64>,
    pub backend: Backend,
    /// Refetch in the background even when the cache answered
    pub revalidate: bool,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            ttl_ms: None,
            backend: Backend::default(),
            revalidate: true,
        }
    }
}

impl RefreshOptions {
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

    pub fn revalidate(mut self, revalidate: bool) -> Self {
        self.revalidate = revalidate;
        self
    }

    fn set_options(&self) -> SetOptions {
        SetOptions {
            ttl_ms: self.ttl_ms,
            backend: self.backend,
            ..SetOptions::default()
        }
    }
}

impl Cache {
    // == Get Or Refresh ==
    /// Returns the cached value for `key`, fetching it when absent.
    ///
    /// On a hit the cached value is returned without waiting on anything; if
    /// `revalidate` is set, `fetcher` runs on a background task and overwrites
    /// the entry when it succeeds. On a miss `fetcher` is awaited and its
    /// result cached. A failed fetch yields None on a miss and leaves the
    /// cached value untouched on a hit. Failures are never cached.
    ///
    /// Must be called within a tokio runtime.
    pub async fn get_or_refresh<T, F, Fut, E>(
        self: &Arc<Self>,
        key: &str,
        fetcher: F,
        opts: RefreshOptions,
    ) -> Option<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        if let Some(cached) = self.get::<T>(key, GetOptions::new().backend(opts.backend)) {
            if opts.revalidate {
                self.revalidate_in_background(key, fetcher, opts);
            }
            return Some(cached);
        }

        match fetcher().await {
            Ok(fresh) => {
                self.set(key, &fresh, opts.set_options());
                Some(fresh)
            }
            Err(e) => {
                let err = CacheError::Fetch {
                    key: key.to_string(),
                    message: e.to_string(),
                };
                warn!("{}", err);
                None
            }
        }
    }

    /// Runs `fetcher` on a background task and caches its result on success.
    ///
    /// The returned handle may be dropped; the write still happens. Returns
    /// None, leaving the cache untouched, when called outside a tokio runtime.
    pub fn revalidate_in_background<T, F, Fut, E>(
        self: &Arc<Self>,
        key: &str,
        fetcher: F,
        opts: RefreshOptions,
    ) -> Option<JoinHandle<()>>
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            warn!("Background refresh of '{}' skipped: no tokio runtime", key);
            return None;
        };

        let cache = Arc::clone(self);
        let key = key.to_string();

        let handle = runtime.spawn(async move {
            match fetcher().await {
                Ok(fresh) => {
                    if cache.set(&key, &fresh, opts.set_options()) {
                        debug!("Revalidated '{}'", key);
                    }
                }
                Err(e) => {
                    let err = CacheError::Fetch {
                        key,
                        message: e.to_string(),
                    };
                    warn!("Background refresh failed, keeping cached value: {}", err);
                }
            }
        });
        Some(handle)
    }
}
