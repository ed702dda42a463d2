//! HTTP ingestion, query API and WebSocket fanout for the hub
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **StoreHandle** in the shared state; handlers never touch hub state directly
//! - **WebSocket** for real-time snapshot/update/alert streaming
//!
//! ## Endpoints
//!
//! Device reports (Bearer auth when a secret is configured):
//! - `POST /api/leak_alert` - Leak alert or clear from a device
//! - `POST /api/sensor_status` - Device status heartbeat
//!
//! Dashboards:
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/stats` - Store statistics
//! - `GET /api/v1/leak/status` - Devices, sensors and recent alerts
//! - `GET /api/v1/leak/alerts` - Alert history (`?limit=K`)
//! - `GET /api/v1/leak/sensors` - Last reading per sensor
//! - `POST /api/v1/leak/clear_alerts` - Empty the alert history (Bearer auth)
//! - `WS /api/v1/leak/stream` - Real-time events

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
pub mod types;
#[cfg(feature = "api")]
pub mod websocket;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
pub use types::{
    AlertsResponse, ClientMessage, HealthResponse, LeakStatusResponse, StatsResponse,
};

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{get, post},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
#[cfg(feature = "api")]
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Optional shared secret required on report and control routes
    pub auth_token: Option<String>,

    /// Enable CORS for dashboard
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            auth_token: None,
            enable_cors: true,
        }
    }
}

/// Build the hub router
#[cfg(feature = "api")]
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut protected = Router::new()
        .route("/api/leak_alert", post(routes::ingest::leak_alert))
        .route("/api/sensor_status", post(routes::ingest::sensor_status))
        .route(
            "/api/v1/leak/clear_alerts",
            post(routes::leak::clear_alerts),
        );

    if let Some(token) = config.auth_token.clone() {
        protected = protected.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::require_secret,
        ));
    }

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/stats", get(routes::health::get_stats))
        .route("/api/v1/leak/status", get(routes::leak::get_status))
        .route("/api/v1/leak/alerts", get(routes::leak::get_alerts))
        .route("/api/v1/leak/sensors", get(routes::leak::get_sensors))
        .route("/api/v1/leak/stream", get(websocket::websocket_handler))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
