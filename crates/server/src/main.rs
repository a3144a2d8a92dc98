use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use convertino_core::{
    builtin_registry, create_retention_system, load_config, load_config_from_env, validate_config,
    Config, Orchestrator, UploadManager,
};
use convertino_server::api::create_router;
use convertino_server::state::AppState;

/// Environment variable naming the config file.
const CONFIG_ENV: &str = "CONVERTINO_CONFIG";

/// Config file used when `CONVERTINO_CONFIG` is not set.
const DEFAULT_CONFIG_PATH: &str = "config.toml";

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

    let config = read_config()?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Staging root: {:?}", config.uploads.staging_root);

    tokio::fs::create_dir_all(&config.uploads.staging_root)
        .await
        .with_context(|| {
            format!(
                "Failed to create staging root {:?}",
                config.uploads.staging_root
            )
        })?;

    let registry = Arc::new(builtin_registry(&config).context("Failed to build format registry")?);
    info!("Registered {} conversions", registry.len());

    // Retention worker; its first sweep clears leftovers from a previous run
    let (retention, retention_worker) =
        create_retention_system(&config.retention, config.uploads.staging_root.clone());
    let worker_handle = tokio::spawn(retention_worker.run());

    let orchestrator = Orchestrator::new(
        Arc::clone(&registry),
        UploadManager::new(&config.uploads),
        retention.clone(),
        config.retention.delay(),
    );

    let backends = orchestrator.backend_status().await;
    for backend in backends.iter().filter(|b| !b.available) {
        warn!(
            conversion = %backend.identifier,
            converter = %backend.converter,
            reason = backend.reason.as_deref().unwrap_or("unknown"),
            "Conversion backend unavailable"
        );
    }

    let state = Arc::new(AppState::new(config.clone(), orchestrator, backends));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // The router held the remaining handles; dropping ours closes the
    // channel and the worker removes whatever is still retained.
    info!("Server shutting down...");
    drop(retention);
    let _ = worker_handle.await;
    info!("Retention worker stopped");

    Ok(())
}

/// Load config from the file named by `CONVERTINO_CONFIG`, else from
/// `config.toml` if present, else from defaults and environment only.
fn read_config() -> Result<Config> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            let path = PathBuf::from(path);
            info!("Loading configuration from {:?}", path);
            load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))
        }
        Err(_) => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                info!("Loading configuration from {:?}", path);
                load_config(&path)
                    .with_context(|| format!("Failed to load config from {:?}", path))
            } else {
                info!("No config file, using defaults and environment");
                load_config_from_env().context("Failed to load config from environment")
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
