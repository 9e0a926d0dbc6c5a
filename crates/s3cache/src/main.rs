//! s3cache - read-through caching proxy for S3 buckets

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::{Config, LoggingConfig};
use s3cache_api::{AppState, create_router};
use s3cache_core::{ProxyService, build_cache};
use s3cache_storage::ObjectStoreBackend;

/// s3cache - read-through caching proxy for S3 buckets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "S3CACHE_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "S3CACHE_PORT")]
    port: Option<u16>,

    /// Cache capacity in bytes, 0 disables caching
    #[arg(long, env = "S3CACHE_CACHE_SIZE")]
    cache_size: Option<u64>,

    /// Directory for persisted cache entries
    #[arg(long, env = "S3CACHE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(size) = args.cache_size {
        config.cache.max_size = size;
    }
    if let Some(dir) = args.cache_dir {
        config.cache.directory = Some(dir);
    }

    init_logging(&config.logging);

    info!("Starting s3cache v{}", env!("CARGO_PKG_VERSION"));
    match &config.source {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("Config file not found at {}, using defaults", args.config),
    }

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;

    let backend = Arc::new(ObjectStoreBackend::new(config.storage.kind()?));

    let cache = build_cache(&config.cache)
        .await
        .context("Failed to initialize cache")?;
    let stats = cache.stats().await;
    info!(
        "Cache ready: {} entries, {} of {} bytes",
        stats.entries, stats.resident_bytes, stats.capacity
    );

    let service = Arc::new(ProxyService::new(
        cache,
        backend,
        config.proxy.directory_policy,
    ));
    info!("Directory policy: {}", config.proxy.directory_policy.as_str());

    let app = create_router(AppState::new(service), Some(Arc::new(metrics_handle)))
        .layer(TraceLayer::new_for_http());

    let bind_addr = args.bind.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port)
        .parse()
        .with_context(|| format!("Invalid bind address: {}:{}", bind_addr, port))?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Initialize logging
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
