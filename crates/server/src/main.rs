use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use multipost_core::{
    create_prompt, load_config, media::HttpFileFetcher, validate_config, AdapterRegistry,
    JsonFileTrustStore, Orchestrator, TrustService, WebDriverHost,
};
use multipost_server::api::{create_router, WsBroadcaster};
use multipost_server::state::AppState;

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
    let config_path = std::env::var("MULTIPOST_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Adapters: {}", config.adapters.len());
    info!("Trust store path: {:?}", config.trust.store_path);

    // Trust gate
    let trust_store = JsonFileTrustStore::open(&config.trust.store_path)
        .await
        .context("Failed to open trust store")?;
    let trust = Arc::new(TrustService::new(
        Arc::new(trust_store),
        create_prompt(&config.trust),
    ));
    info!("Using trust prompt: {}", trust.prompt_mode());

    // Surface host (the WebDriver session is created on first open)
    let host = WebDriverHost::new(config.webdriver.clone())
        .context("Failed to create WebDriver host")?;
    info!("WebDriver host configured at {}", config.webdriver.url);

    let fetcher = HttpFileFetcher::new(&config.media).context("Failed to create file fetcher")?;
    let adapters = AdapterRegistry::new(config.adapters.clone());
    info!("Registered adapters: {:?}", adapters.ids());

    let orchestrator = Arc::new(Orchestrator::new(
        config.orchestrator.clone(),
        config.media.clone(),
        Arc::new(host),
        adapters,
        Arc::new(fetcher),
    ));

    // Job events go out over the WebSocket
    let ws_broadcaster = WsBroadcaster::default();
    let forwarder = ws_broadcaster.forward_job_events(orchestrator.subscribe());
    let prompt_forwarder = trust
        .subscribe_prompts()
        .map(|prompts| ws_broadcaster.forward_trust_prompts(prompts));
    info!("WebSocket broadcaster initialized");

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        trust,
        Arc::clone(&orchestrator),
        ws_broadcaster,
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

    info!("Server shutting down...");
    forwarder.abort();
    if let Some(prompt_forwarder) = prompt_forwarder {
        prompt_forwarder.abort();
    }

    let open = orchestrator.surfaces().active_count().await;
    if open > 0 {
        info!("Leaving {} surfaces open", open);
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
