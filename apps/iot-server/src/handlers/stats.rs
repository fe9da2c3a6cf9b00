//! 统计与健康检查 handlers
//!
//! - GET /health
//! - GET /ws/stats
//! - GET /ingest/stats
//! - GET /metrics

use crate::AppState;
use api_contract::{ApiResponse, ConnectionStatsDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use iot_realtime::{RoomInfo, UserInfo};
use iot_telemetry::metrics;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RealtimeStatsDto {
    #[serde(flatten)]
    pub connections: ConnectionStatsDto,
    pub rooms: Vec<RoomInfo>,
    pub users: Vec<UserInfo>,
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

pub async fn ws_stats(State(state): State<AppState>) -> Response {
    let registry = state.registry();
    let data = RealtimeStatsDto {
        connections: registry.stats(),
        rooms: registry.room_info(),
        users: registry.user_info(),
    };
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

pub async fn ingest_stats(State(state): State<AppState>) -> Response {
    match &state.ingress {
        Some(client) => (StatusCode::OK, Json(ApiResponse::success(client.stats()))).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::<()>::error(
                "INGEST.DISABLED",
                "ingest is disabled",
            )),
        )
            .into_response(),
    }
}

pub async fn get_metrics() -> Response {
    (StatusCode::OK, Json(ApiResponse::success(metrics().snapshot()))).into_response()
}
