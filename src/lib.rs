//! sensor-api: HTTP access to the IAQ sensor readings table.
//!
//! ```text
//! GET  /api/sensor-data          historical readings, tagged
//! POST /api/sensor-data          insert one reading
//! GET  /api/sensor-data/latest   most recent readings, untagged
//! GET  /health                   store liveness
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod query;
pub mod reading;
pub mod sanitize;
pub mod store;
pub mod tags;

use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use handlers::{
    get_latest_handler, get_sensor_data_handler, health_handler, post_sensor_data_handler,
};
use store::ReadingStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReadingStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self { store }
    }
}

/// Cross-origin policy for the dashboard: any origin, with credentials.
///
/// A wildcard origin cannot be combined with credentials, so the request's
/// origin is mirrored back instead.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/sensor-data",
            get(get_sensor_data_handler).post(post_sensor_data_handler),
        )
        .route("/api/sensor-data/latest", get(get_latest_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

/// Install the fmt subscriber. RUST_LOG wins over `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
