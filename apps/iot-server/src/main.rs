//! IoT 接入服务：MQTT 接入、持久化、报警与 WebSocket 实时推送。

mod handlers;
mod ingest;
mod routes;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
};
use iot_config::AppConfig;
use iot_ingest::IngressClient;
use iot_pipeline::IngestPipeline;
use iot_realtime::{ConnectionRegistry, FanoutDispatcher, SessionContext, spawn_liveness_probe};
use iot_storage::{
    CachePolicy, GatewayStore, PgGatewayStore, PgReadingStore, PgSensorStore, ReadingCache,
    ReadingStore, RedisReadingCache, SensorStore, connect_pool,
};
use iot_telemetry::{init_tracing, new_request_ids};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, error, info};

/// 各 handler 共享的服务对象（启动时构造一次）。
#[derive(Clone)]
pub struct AppState {
    pub session: SessionContext,
    /// 未启用接入时为 None。
    pub ingress: Option<Arc<IngressClient>>,
}

impl AppState {
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.session.dispatcher.registry()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    // 关系库与时序表共用一个连接池（需先执行 migrations）
    let pool = connect_pool(&config.database_url).await?;
    let sensors: Arc<dyn SensorStore> = Arc::new(PgSensorStore::new(pool.clone()));
    let gateways: Arc<dyn GatewayStore> = Arc::new(PgGatewayStore::new(pool.clone()));
    let readings: Arc<dyn ReadingStore> = Arc::new(PgReadingStore::new(pool));
    let cache_policy = CachePolicy {
        latest_ttl_seconds: config.cache_latest_ttl_seconds,
        series_ttl_seconds: config.cache_series_ttl_seconds,
        series_cap: config.cache_series_cap,
    };
    let cache: Arc<dyn ReadingCache> =
        Arc::new(RedisReadingCache::connect(&config.redis_url, cache_policy)?);

    let registry = Arc::new(ConnectionRegistry::new());
    let dispatcher = FanoutDispatcher::new(registry.clone());
    let pipeline = Arc::new(IngestPipeline::new(
        sensors,
        gateways,
        readings,
        cache,
        dispatcher.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (ingress, ingest_task) = if config.ingest_enabled {
        let client = Arc::new(ingest::build_client(&config));
        let task = ingest::spawn_ingest(client.clone(), pipeline, shutdown_rx.clone());
        (Some(client), Some(task))
    } else {
        info!(target: "iot.ingest", "ingest_disabled");
        (None, None)
    };

    let probe = spawn_liveness_probe(
        dispatcher.clone(),
        Duration::from_secs(config.ws_ping_interval_seconds.max(1)),
        shutdown_rx,
    );

    let state = AppState {
        session: SessionContext {
            dispatcher,
            send_buffer: config.ws_send_buffer,
        },
        ingress,
    };
    let app = routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context));

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(target: "iot.server", addr = %config.http_addr, "http_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx, registry))
        .await?;

    if let Err(err) = probe.await {
        error!(target: "iot.server", error = %err, "liveness_probe_join_failed");
    }
    if let Some(task) = ingest_task {
        if let Err(err) = task.await {
            error!(target: "iot.server", error = %err, "ingest_join_failed");
        }
    }
    info!(target: "iot.server", "server_stopped");
    Ok(())
}

/// Ctrl-C 后：通知接入与探测任务退出，关闭全部实时连接，再让 axum 停止接受新连接。
async fn shutdown_signal(shutdown: watch::Sender<bool>, registry: Arc<ConnectionRegistry>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target: "iot.server", error = %err, "ctrl_c_listen_failed");
    }
    info!(target: "iot.server", "shutdown_requested");
    shutdown.send_replace(true);
    registry.close_all();
}

async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    // 生成 request_id 与 trace_id，并注入请求扩展与日志
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}
