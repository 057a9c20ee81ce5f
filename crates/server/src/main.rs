use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use idswidget_core::{
    load_config, validate_config, HostAllowList, HttpFetcher, HttpValidationEngine,
    RemoteFetcher, ValidationEngine,
};
use idswidget_server::{api::create_router, state::AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("IDSWIDGET_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Uploads directory: {:?}", config.storage.uploads_dir);
    info!("Cache key scheme: {:?}", config.storage.key_scheme);
    info!("Validation engine: {}", config.engine.url);

    // Create remote fetchers; proxy redirects stay on the allow-list
    let fetcher: Arc<dyn RemoteFetcher> =
        Arc::new(HttpFetcher::new(&config.fetcher).context("Failed to create HTTP fetcher")?);
    let proxy_fetcher: Arc<dyn RemoteFetcher> = Arc::new(
        HttpFetcher::with_allowed_hosts(
            &config.fetcher,
            HostAllowList::new(&config.proxy.allowed_hosts),
        )
        .context("Failed to create proxy HTTP fetcher")?,
    );
    if !config.proxy.allowed_hosts.is_empty() {
        info!("Proxy restricted to hosts: {:?}", config.proxy.allowed_hosts);
    }

    // Create validation engine client
    let engine: Arc<dyn ValidationEngine> = Arc::new(
        HttpValidationEngine::new(&config.engine)
            .context("Failed to create validation engine client")?,
    );
    info!("Using validation engine client: {}", engine.name());

    // Create app state
    let state = Arc::new(AppState::with_fetchers(
        config.clone(),
        fetcher,
        proxy_fetcher,
        engine,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
