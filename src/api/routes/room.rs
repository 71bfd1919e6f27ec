//! Room control endpoints.
//!
//! Provides HTTP endpoints for:
//! - Joining a room (POST /join)
//! - Leaving a room and running meeting closure (POST /leave)
//! - Service status including the last closure run (GET /status)
//! - The current caption and summary notice (GET /rooms/:room/caption)

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::app::RoomRegistry;
use crate::closure::{ClosureStatus, ClosureStatusHandle};

/// Request body naming the room to join or leave.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomRequest {
    pub room: String,
}

pub enum ApiCommand {
    Join {
        room: String,
        respond: oneshot::Sender<Result<(), String>>,
    },
    Leave {
        room: String,
        respond: oneshot::Sender<Result<(), String>>,
    },
}

#[derive(Clone)]
pub struct RoomApiState {
    pub tx: mpsc::Sender<ApiCommand>,
    pub registry: RoomRegistry,
    pub closure: ClosureStatusHandle,
}

/// Creates the room router with all room-related endpoints.
pub fn router(state: RoomApiState) -> Router {
    Router::new()
        .route("/join", post(join_room))
        .route("/leave", post(leave_room))
        .route("/status", get(service_status))
        .route("/rooms/:room/caption", get(room_caption))
        .with_state(state)
}

async fn join_room(
    State(state): State<RoomApiState>,
    Json(request): Json<RoomRequest>,
) -> ApiResult<Json<Value>> {
    info!("Join command received via API for room '{}'", request.room);

    let (respond, outcome) = oneshot::channel();
    state
        .tx
        .send(ApiCommand::Join {
            room: request.room.clone(),
            respond,
        })
        .await
        .map_err(|_| ApiError::internal("Service loop is not running"))?;

    match outcome.await {
        Ok(Ok(())) => Ok(Json(json!({
            "success": true,
            "room": request.room,
        }))),
        Ok(Err(message)) => Err(ApiError::bad_request(message)),
        Err(_) => Err(ApiError::internal("Service loop dropped the request")),
    }
}

async fn leave_room(
    State(state): State<RoomApiState>,
    Json(request): Json<RoomRequest>,
) -> ApiResult<Json<Value>> {
    info!("Leave command received via API for room '{}'", request.room);

    let (respond, outcome) = oneshot::channel();
    state
        .tx
        .send(ApiCommand::Leave {
            room: request.room.clone(),
            respond,
        })
        .await
        .map_err(|_| ApiError::internal("Service loop is not running"))?;

    match outcome.await {
        Ok(Ok(())) => {
            // The closure run has reached a terminal state by the time the
            // service loop replies; report how it ended.
            let closure = state.closure.get().await;
            Ok(Json(json!({
                "success": true,
                "room": request.room,
                "closure": closure.status.as_str(),
                "summary_url": closure.summary_url,
            })))
        }
        Ok(Err(message)) => Err(ApiError::bad_request(message)),
        Err(_) => Err(ApiError::internal("Service loop dropped the request")),
    }
}

async fn service_status(State(state): State<RoomApiState>) -> Json<Value> {
    let rooms = state.registry.rooms().await;
    let closure = state.closure.get().await;

    let failure = match &closure.status {
        ClosureStatus::Failed { stage, reason } => json!({
            "stage": stage.as_str(),
            "reason": reason,
        }),
        _ => Value::Null,
    };

    Json(json!({
        "rooms": rooms,
        "closure": {
            "state": closure.status.as_str(),
            "room": closure.room,
            "summary_url": closure.summary_url,
            "link_expires_at": closure.link_expires_at.map(|at| at.to_rfc3339()),
            "failure": failure,
            "emails": closure.emails.map(|emails| json!({
                "succeeded": emails.succeeded,
                "failed": emails.failed,
            })),
        },
    }))
}

async fn room_caption(
    Path(room): Path<String>,
    State(state): State<RoomApiState>,
) -> ApiResult<Json<Value>> {
    let view = state
        .registry
        .get(&room)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Not joined to room '{}'", room)))?;

    let caption = view.caption.get().await;
    let notice = view.notice.get().await;

    let caption_value = if caption.is_empty() {
        Value::Null
    } else {
        json!({
            "sender": caption.sender,
            "text": caption.text,
            "expires_at": caption.expires_at.map(|at| at.to_rfc3339()),
        })
    };

    Ok(Json(json!({
        "caption": caption_value,
        "summary": notice.map(|notice| json!({
            "room": notice.room,
            "url": notice.url,
        })),
    })))
}
