//! REST API server for VoxBridge.
//!
//! Provides HTTP endpoints for:
//! - Room control (join, leave)
//! - Service and closure status
//! - The current caption and summary notice per room
//!
//! This is the local UI layer's view of the relay; it carries no business
//! logic of its own.

pub mod error;
pub mod routes;

use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tracing::info;

pub use routes::room::{ApiCommand, RoomApiState, RoomRequest};

use crate::app::RoomRegistry;
use crate::closure::ClosureStatusHandle;
use crate::config::Config;

pub struct ApiServer {
    port: u16,
    room_state: RoomApiState,
}

impl ApiServer {
    pub fn new(
        tx: tokio::sync::mpsc::Sender<ApiCommand>,
        registry: RoomRegistry,
        closure: ClosureStatusHandle,
        config: &Config,
    ) -> Self {
        Self {
            port: config.api.port,
            room_state: RoomApiState {
                tx,
                registry,
                closure,
            },
        }
    }

    pub async fn start(self) -> Result<()> {
        let app = Router::new()
            .route("/", get(service_info))
            .route("/version", get(version))
            .merge(routes::room::router(self.room_state))
            .layer(ServiceBuilder::new());

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET  /                    - Service info");
        info!("  GET  /version             - Get version info");
        info!("  POST /join                - Join a room");
        info!("  POST /leave               - Leave a room (runs closure)");
        info!("  GET  /status              - Rooms and last closure run");
        info!("  GET  /rooms/:room/caption - Current caption and summary notice");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "voxbridge",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "voxbridge"
    }))
}
