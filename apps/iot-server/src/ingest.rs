//! 接入链路装配：MQTT 连接器 → 接入客户端 → 流水线。

use iot_config::AppConfig;
use iot_ingest::{
    FrameHandler, IngestError, IngressClient, MqttConnector, MqttConnectorConfig, ReconnectPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 按配置构造接入客户端。
pub fn build_client(config: &AppConfig) -> IngressClient {
    let connector = MqttConnector::new(MqttConnectorConfig {
        host: config.mqtt_host.clone(),
        port: config.mqtt_port,
        username: config.mqtt_username.clone(),
        password: config.mqtt_password.clone(),
        keep_alive_seconds: config.mqtt_keepalive_seconds,
    });
    let policy = ReconnectPolicy {
        interval: Duration::from_secs(config.mqtt_reconnect_interval_seconds),
        max_attempts: config.mqtt_max_reconnect_attempts,
    };
    IngressClient::new(Arc::new(connector), policy)
}

/// 启动接入任务。
///
/// 重连次数耗尽是致命错误：记录 error 日志后任务结束，
/// 进程继续为 WebSocket 客户端服务，接入需要外部重启。
pub fn spawn_ingest(
    client: Arc<IngressClient>,
    handler: Arc<dyn FrameHandler>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match client.run(handler, shutdown).await {
            Ok(()) => info!(target: "iot.ingest", "ingest_stopped"),
            Err(IngestError::ReconnectExhausted { attempts }) => {
                error!(
                    target: "iot.ingest",
                    attempts,
                    "ingest_reconnect_exhausted_restart_required"
                );
            }
            Err(err) => error!(target: "iot.ingest", error = %err, "ingest_failed"),
        }
    })
}
