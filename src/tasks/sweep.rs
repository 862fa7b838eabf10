//! Sweep Task
//!
//! Background task that periodically removes expired and corrupted records.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::Cache;

/// Spawns a background task that sweeps `cache` every `interval`.
///
/// The task holds only a weak reference and ends on its own once the cache
/// is dropped. Abort the returned handle to stop it earlier.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(Cache::in_memory(CacheConfig::default()));
/// let handle = spawn_sweep_task(Arc::downgrade(&cache), Duration::from_secs(60));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_sweep_task(cache: Weak<Cache>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting cache sweep task with interval of {:?}", interval);

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            let Some(cache) = cache.upgrade() else {
                debug!("Cache dropped, sweep task exiting");
                break;
            };

            let report = cache.sweep();

            // Log sweep statistics
            if report.removed() > 0 || report.errors > 0 {
                info!(
                    "Cache sweep: removed {} expired and {} corrupted entries ({} errors)",
                    report.expired, report.corrupted, report.errors
                );
            } else {
                debug!("Cache sweep: nothing to remove");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MemoryStorage, StorageBackend};
    use crate::cache::{ManualClock, SetOptions};
    use crate::config::CacheConfig;
    use serde_json::json;
    use std::sync::Arc;

    fn create_test_cache() -> (Arc<Cache>, Arc<ManualClock>, Arc<MemoryStorage>) {
        let clock = Arc::new(ManualClock::new(0));
        let durable = Arc::new(MemoryStorage::new());
        let config = CacheConfig {
            sweep_interval: Duration::from_millis(50),
            ..CacheConfig::default()
        };
        let cache = Cache::new(config, Arc::new(MemoryStorage::new()), durable.clone())
            .with_clock(clock.clone());
        (Arc::new(cache), clock, durable)
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired_entries() {
        let (cache, clock, durable) = create_test_cache();
        cache.set("expire_soon", &json!("value"), SetOptions::new().ttl_ms(100));

        let handle = spawn_sweep_task(Arc::downgrade(&cache), Duration::from_millis(50));
        clock.advance(1_000);

        // Wait for at least one sweep to run
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(
            durable.list_keys().unwrap().is_empty(),
            "Expired entry should have been swept"
        );
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_preserves_valid_entries() {
        let (cache, _clock, durable) = create_test_cache();
        cache.set("long_lived", &json!("value"), SetOptions::new().ttl_ms(3_600_000));

        let handle = spawn_sweep_task(Arc::downgrade(&cache), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(durable.list_keys().unwrap().len(), 1);
        assert!(cache.contains("long_lived", Backend::Durable));
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_exits_when_cache_dropped() {
        let (cache, _clock, _durable) = create_test_cache();
        let handle = spawn_sweep_task(Arc::downgrade(&cache), Duration::from_millis(10));

        drop(cache);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(handle.is_finished(), "Task should end once the cache is gone");
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (cache, clock, durable) = create_test_cache();
        cache.set("k", &json!(1), SetOptions::new().ttl_ms(10));

        assert!(cache.start());
        assert!(cache.start());
        assert!(cache.is_running());

        clock.advance(100);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(durable.list_keys().unwrap().is_empty());

        assert!(cache.stop());
        assert!(!cache.is_running());
        assert!(!cache.stop());
    }
}
