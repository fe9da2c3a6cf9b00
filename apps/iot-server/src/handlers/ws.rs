//! WebSocket 升级 handlers
//!
//! - GET /ws?user_id=&room=
//! - GET /ws/sensor/{id}：房间 `sensor_{id}`
//! - GET /ws/gateway/{id}：房间 `gateway_{id}`

use crate::AppState;
use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    response::Response,
};
use iot_realtime::run_session;

#[derive(Debug, Default, serde::Deserialize)]
pub struct WsQuery {
    pub user_id: Option<String>,
    pub room: Option<String>,
}

pub async fn ws_connect(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, ws, query.user_id, query.room)
}

pub async fn ws_sensor(
    State(state): State<AppState>,
    Path(sensor_id): Path<i64>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, ws, query.user_id, Some(format!("sensor_{}", sensor_id)))
}

pub async fn ws_gateway(
    State(state): State<AppState>,
    Path(gateway_id): Path<i64>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, ws, query.user_id, Some(format!("gateway_{}", gateway_id)))
}

fn upgrade(
    state: AppState,
    ws: WebSocketUpgrade,
    user_id: Option<String>,
    room: Option<String>,
) -> Response {
    let ctx = state.session.clone();
    ws.on_upgrade(move |socket| run_session(socket, ctx, user_id, room))
}
