//! ==============================================================================
//! main.rs - sensor api entry point
//! ==============================================================================
//!
//! purpose:
//!     composition root. reads configuration, opens the connection pool,
//!     builds the router and serves until ctrl-c / SIGTERM.
//!
//! responsibilities:
//!     - load .env, config file and environment overrides
//!     - install the tracing subscriber
//!     - open the MySQL pool (fatal if the database is unreachable)
//!     - serve the api with a permissive CORS policy
//!     - close the pool after the listener drains
//!
//! usage:
//!     sensor-api             serve against MySQL
//!     sensor-api --memory    serve against an in-process table (development)
//!
//! ==============================================================================

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use sensor_api::{
    config::ServiceConfig,
    create_router, init_tracing,
    store::{MemoryStore, MySqlStore, ReadingStore},
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: environment and configuration
    let dotenv_loaded = dotenv::dotenv().is_ok();
    let loaded = ServiceConfig::load_or_default();
    let config = loaded.config;

    // step 2: logging
    init_tracing(&config.logging.level);
    info!("Sensor API v{}", env!("CARGO_PKG_VERSION"));
    if dotenv_loaded {
        info!("[CONFIG] Loaded .env");
    }
    if let Some(path) = &loaded.source {
        info!("[CONFIG] Loaded from {}", path.display());
    }
    for note in &loaded.notes {
        warn!("[CONFIG] {}", note);
    }
    config.validate().context("invalid configuration")?;
    config.print_summary();

    // step 3: storage
    let use_memory = std::env::args().skip(1).any(|arg| arg == "--memory");
    let store: Arc<dyn ReadingStore> = if use_memory {
        warn!("[STARTUP] Using in-memory store, readings are lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        let store = MySqlStore::connect(&config.database, &config.pool)
            .await
            .context("failed to connect to database")?;
        Arc::new(store)
    };

    // step 4: serve
    let app = create_router(AppState::new(store.clone()));
    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!("[STARTUP] Starting sensor API server on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // step 5: release the pool
    store.close().await;
    info!("[SHUTDOWN] Stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
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

    info!("[SHUTDOWN] Signal received, draining connections");
}
