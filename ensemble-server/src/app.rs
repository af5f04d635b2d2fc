use crate::config::RoomConfig;
use crate::room::RoomManager;
use crate::signaling::{SignalingService, ws_handler};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use ensemble_core::{RoomId, RoomStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Process-wide relay state. Created once at startup, never persisted.
#[derive(Clone)]
pub struct AppState {
    pub signaling: SignalingService,
    pub rooms: RoomManager,
}

impl AppState {
    pub fn new(config: RoomConfig) -> Self {
        let signaling = SignalingService::new();
        let rooms = RoomManager::new(config, Arc::new(signaling.clone()));
        Self { signaling, rooms }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/rooms-status", get(rooms_status))
        .layer(cors)
        .with_state(state)
}

pub async fn rooms_status(State(state): State<AppState>) -> Json<BTreeMap<RoomId, RoomStatus>> {
    Json(state.rooms.rooms_status())
}
