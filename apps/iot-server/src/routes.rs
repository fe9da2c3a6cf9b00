//! 路由定义
//!
//! - 健康检查：/health
//! - 实时推送：/ws, /ws/sensor/{id}, /ws/gateway/{id}
//! - 统计：/ws/stats, /ingest/stats, /metrics

use super::AppState;
use super::handlers::*;
use axum::{Router, routing::get};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_connect))
        .route("/ws/sensor/:sensor_id", get(ws_sensor))
        .route("/ws/gateway/:gateway_id", get(ws_gateway))
        .route("/ws/stats", get(ws_stats))
        .route("/ingest/stats", get(ingest_stats))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::AppState;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use iot_realtime::{ChannelSink, ConnectionRegistry, FanoutDispatcher, SessionContext};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> (AppState, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let state = AppState {
            session: SessionContext {
                dispatcher: FanoutDispatcher::new(registry.clone()),
                send_buffer: 8,
            },
            ingress: None,
        };
        (state, registry)
    }

    async fn get_json(state: AppState, uri: &str) -> (StatusCode, Value) {
        let response = create_router(state)
            .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (state, _) = state();
        let (status, body) = get_json(state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn ws_stats_lists_rooms_and_users() {
        let (state, registry) = state();
        let (sink, _outbound) = ChannelSink::new(4);
        registry
            .register(sink, Some("alice".to_string()), Some("sensor_3".to_string()))
            .expect("register");

        let (status, body) = get_json(state, "/ws/stats").await;
        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert_eq!(data["active_connections"], 1);
        assert_eq!(data["total_connections"], 1);
        assert_eq!(data["rooms"][0]["room"], "sensor_3");
        assert_eq!(data["users"][0]["user_id"], "alice");
    }

    #[tokio::test]
    async fn ingest_stats_without_broker_is_unavailable() {
        let (state, _) = state();
        let (status, body) = get_json(state, "/ingest/stats").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "INGEST.DISABLED");
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade() {
        let (state, _) = state();
        let response = create_router(state)
            .oneshot(Request::get("/ws").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert!(response.status().is_client_error());
    }
}
