//! Tabcache - A client-side TTL cache
//!
//! Composition root: owns the single cache instance of a process, keeps its
//! durable directory swept and tidies up on shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tabcache::{Backend, Cache, CacheConfig};

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the cache over the configured durable directory
/// 4. Run an initial sweep and start the periodic one
/// 5. On SIGINT/SIGTERM, stop the sweep and run a final one
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tabcache");

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: default_ttl={}ms, sweep_interval={:?}, quota={} bytes, dir={}",
        config.default_ttl_ms,
        config.sweep_interval,
        config.quota_bytes,
        config.cache_dir.display()
    );

    let cache = Arc::new(
        Cache::open(config.clone())
            .with_context(|| format!("opening cache at {}", config.cache_dir.display()))?,
    );

    let report = cache.sweep();
    info!(
        "Initial sweep: {} records scanned, {} removed",
        report.scanned,
        report.removed()
    );
    log_usage(&cache);

    cache.start();
    info!("Background sweep started");

    shutdown_signal().await;

    cache.stop();
    let report = cache.sweep();
    info!("Final sweep removed {} entries", report.removed());
    log_usage(&cache);

    info!("Shutdown complete");
    Ok(())
}

fn log_usage(cache: &Cache) {
    for backend in Backend::PERSISTENT {
        if let Some(usage) = cache.usage(backend) {
            info!(
                "{} backend: {} entries, {} bytes used, {} bytes free",
                backend,
                usage.entry_count,
                usage.used_bytes,
                usage
                    .remaining_bytes()
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "unbounded".to_string())
            );
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
