use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use patchwatch_core::{
    create_local_dispatcher, load_config, validate_config, Controller, ControllerDeps,
    ControllerRunner, GerritClient, MemoryStateStore, PrometheusSink, ReviewClient,
    SqliteStateStore, StateStore, StoreBackend, SystemClock, TaskDispatcher,
};

use patchwatch_server::api::create_router;
use patchwatch_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

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
    let config_path = std::env::var("PATCHWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        project = %config.review.project,
        branch = %config.review.branch,
        jobs = config.jobs.len(),
        voting_enabled = config.controller.voting_enabled,
        "Configuration loaded successfully"
    );

    // Create state store
    let store: Arc<dyn StateStore> = match config.store.backend {
        StoreBackend::Sqlite => {
            info!("Database path: {:?}", config.store.path);
            Arc::new(
                SqliteStateStore::new(&config.store.path)
                    .context("Failed to open state store")?,
            )
        }
        StoreBackend::Memory => {
            info!("Using in-memory state store (state is lost on restart)");
            Arc::new(MemoryStateStore::new())
        }
    };

    // Create review client
    let review: Arc<dyn ReviewClient> = Arc::new(
        GerritClient::new(config.review.clone()).context("Failed to create review client")?,
    );
    info!("Using review backend {} at {}", review.name(), config.review.url);

    // Create dispatch system
    let (local_dispatcher, worker) = create_local_dispatcher(config.dispatcher.clone());
    let dispatcher: Arc<dyn TaskDispatcher> = Arc::new(local_dispatcher);

    // Create controller
    let controller = Arc::new(
        Controller::new(
            &config,
            ControllerDeps {
                store,
                review,
                dispatcher: Arc::clone(&dispatcher),
                metrics: Arc::new(PrometheusSink::new()),
                clock: Arc::new(SystemClock),
            },
        )
        .context("Failed to create controller")?,
    );

    // Spawn dispatch worker
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker_handle = tokio::spawn(worker.run(controller.clone(), shutdown_rx));
    info!("Dispatch worker started");

    // Start cron loops
    let runner = Arc::new(ControllerRunner::new(
        config.controller.clone(),
        Arc::clone(&dispatcher),
    ));
    runner.start();

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        controller,
        dispatcher,
        Some(Arc::clone(&runner)),
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
    runner.stop().await;

    // In-flight tasks are abandoned; the next sweep redoes them.
    let _ = shutdown_tx.send(());
    let _ = worker_handle.await;
    info!("Dispatch worker stopped");

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
