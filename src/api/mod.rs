//! REST API server for meetstate.
//!
//! Provides HTTP endpoints for:
//! - Service info and version
//! - Current meeting presence (plain JSON or waybar style)

pub mod error;
pub mod routes;

use crate::config::ApiConfig;
use crate::publisher::PresenceStatusHandle;
use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::info;

pub struct ApiServer {
    port: u16,
    status: PresenceStatusHandle,
}

impl ApiServer {
    pub fn new(status: PresenceStatusHandle, config: &ApiConfig) -> Self {
        Self {
            port: config.port,
            status,
        }
    }

    pub fn router(status: PresenceStatusHandle) -> Router {
        Router::new()
            .route("/", get(service_info))
            .route("/version", get(version))
            .merge(routes::state::router(status))
            .layer(ServiceBuilder::new())
    }

    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        let app = Self::router(self.status);

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET  /              - Service info");
        info!("  GET  /version       - Get version info");
        info!("  GET  /state         - Get meeting presence");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "meetstate",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "meetstate"
    }))
}
