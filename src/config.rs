//! Configuration Module
//!
//! Cache tuning knobs. The library takes a [`CacheConfig`] explicitly; only the
//! composition root loads one from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default entry lifetime (5 minutes)
pub const DEFAULT_TTL_MS: u64 = 5 * 60 * 1000;

/// Default per-backend quota, matching the usual browser storage limit
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

/// Cache configuration parameters.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime in milliseconds for entries written without explicit TTL
    pub default_ttl_ms: u64,
    /// Interval between periodic sweeps
    pub sweep_interval: Duration,
    /// Whether large entries are compressed
    pub compress: bool,
    /// Entry JSON length above which compression kicks in
    pub compress_threshold: usize,
    /// Whether payloads are obfuscated
    pub obfuscate: bool,
    /// Prefix marking backend keys owned by this cache
    pub key_prefix: String,
    /// Byte quota applied to the session and durable backends
    pub quota_bytes: u64,
    /// Directory of the durable backend
    pub cache_dir: PathBuf,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `CACHE_SWEEP_INTERVAL_SECS` - Sweep frequency in seconds (default: 60)
    /// - `CACHE_COMPRESS` - Enable compression (default: true)
    /// - `CACHE_COMPRESS_THRESHOLD` - Compression threshold in bytes (default: 1024)
    /// - `CACHE_OBFUSCATE` - Enable obfuscation (default: true)
    /// - `CACHE_KEY_PREFIX` - Registry prefix (default: "tabcache:")
    /// - `CACHE_QUOTA_BYTES` - Per-backend quota (default: 5 MiB)
    /// - `CACHE_DIR` - Durable backend directory (default: ".tabcache")
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_ttl_ms: parse_var("CACHE_DEFAULT_TTL_MS").unwrap_or(defaults.default_ttl_ms),
            sweep_interval: parse_var("CACHE_SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            compress: parse_var("CACHE_COMPRESS").unwrap_or(defaults.compress),
            compress_threshold: parse_var("CACHE_COMPRESS_THRESHOLD")
                .unwrap_or(defaults.compress_threshold),
            obfuscate: parse_var("CACHE_OBFUSCATE").unwrap_or(defaults.obfuscate),
            key_prefix: env::var("CACHE_KEY_PREFIX")
                .ok()
                .filter(|p| !p.is_empty())
                .unwrap_or(defaults.key_prefix),
            quota_bytes: parse_var("CACHE_QUOTA_BYTES").unwrap_or(defaults.quota_bytes),
            cache_dir: env::var("CACHE_DIR")
                .ok()
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: DEFAULT_TTL_MS,
            sweep_interval: Duration::from_secs(60),
            compress: true,
            compress_threshold: 1024,
            obfuscate: true,
            key_prefix: "tabcache:".to_string(),
            quota_bytes: DEFAULT_QUOTA_BYTES,
            cache_dir: PathBuf::from(".tabcache"),
        }
    }
}
