use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use admission_gate::config::LogFormat;
use admission_gate::rate_store::{MemoryRateStore, RateStore, RedisRateStore, StoreError};
use admission_gate::retry::retry_with_backoff;
use admission_gate::{AppState, Config, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();

    // Logging follows the loaded config; a config that failed to load is
    // reported with the defaults
    match &config {
        Ok(config) => init_tracing(&config.log_level, config.log_format),
        Err(_) => init_tracing("info", LogFormat::Pretty),
    }

    info!("Starting admission gate v{}", env!("CARGO_PKG_VERSION"));

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e}");
            return ExitCode::from(exitcode::CONFIG as u8);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Build the log filter from a `RUST_LOG`-style directive, falling back to `info`.
fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("Invalid log filter {level:?} ({e}), using \"info\"");
        EnvFilter::new("info")
    })
}

/// Initialize logging with the configured filter and format.
fn init_tracing(level: &str, format: LogFormat) {
    let filter = log_filter(level);

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init(),
    }
}

/// Run the application, returning an exit code on error.
async fn run(config: Config) -> Result<(), exitcode::ExitCode> {
    info!(
        host = %config.host,
        port = %config.port,
        rate_limit_enabled = config.rate_limit_enabled,
        external_store = config.uses_external_store(),
        proxy_validation = config.proxy_validation_enabled(),
        "Configuration loaded"
    );

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    let rate_store = connect_rate_store(&config).await?;

    // Build application state and router
    let state = AppState::new(config.clone(), rate_store);
    let app = build_router(state.clone());

    // Start server
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("  GET  /health            - Health check");
    info!("  GET  /ready             - Readiness check");
    info!("  GET  /api/auth/session  - Current session");

    // Peer addresses feed client IP resolution
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Connect the counter store named by the configuration.
///
/// The Redis connection is retried with backoff; if it still cannot be
/// reached the process exits rather than serving with an unusable limiter.
async fn connect_rate_store(config: &Config) -> Result<Arc<dyn RateStore>, exitcode::ExitCode> {
    let Some(url) = config.rate_store_url.as_deref() else {
        warn!("RATE_STORE_URL not set, counting requests in process memory (single instance only)");
        return Ok(Arc::new(MemoryRateStore::new()));
    };

    info!("Connecting to rate store...");
    let token = config.rate_store_token.as_deref();
    let policy = config.store_connect_policy();
    let store = retry_with_backoff(policy, "rate store connect", move || async move {
        let store = RedisRateStore::connect(url, token).await?;
        store.ping().await?;
        Ok::<_, StoreError>(store)
    })
    .await
    .map_err(|e| {
        error!("Failed to connect to rate store: {e}");
        exitcode::UNAVAILABLE
    })?;
    info!("Successfully connected to rate store");

    Ok(Arc::new(store))
}
