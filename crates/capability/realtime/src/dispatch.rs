//! 扇出投递与存活探测。

use crate::registry::{ConnectionId, ConnectionRegistry, Recipient};
use api_contract::{ServerFrame, now_rfc3339};
use futures_util::future::join_all;
use iot_telemetry::FailureKind;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

/// 单次扇出的投递结果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// 扇出投递器。
///
/// 每次投递先取注册表快照，再对快照成员并发发送。
/// 某个成员发送失败只注销该成员，不影响其余成员。
#[derive(Clone)]
pub struct FanoutDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl FanoutDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// 广播给全部连接（可排除部分连接）。
    pub async fn broadcast(&self, frame: &ServerFrame, exclude: &[ConnectionId]) -> DeliveryReport {
        let recipients = self.registry.snapshot_all(exclude);
        self.deliver("broadcast", recipients, frame).await
    }

    pub async fn broadcast_to_room(&self, room: &str, frame: &ServerFrame) -> DeliveryReport {
        let recipients = self.registry.snapshot_room(room);
        self.deliver("room", recipients, frame).await
    }

    pub async fn send_to_user(&self, user_id: &str, frame: &ServerFrame) -> DeliveryReport {
        let recipients = self.registry.snapshot_user(user_id);
        self.deliver("user", recipients, frame).await
    }

    pub async fn send_to_connection(&self, id: ConnectionId, frame: &ServerFrame) -> DeliveryReport {
        let recipients = self.registry.snapshot_one(id).into_iter().collect();
        self.deliver("connection", recipients, frame).await
    }

    /// 推送传感器数据：只投递给未设置订阅或订阅了该传感器的连接。
    pub async fn broadcast_sensor_data(&self, sensor_id: i64, frame: &ServerFrame) -> DeliveryReport {
        let recipients = self.registry.snapshot_sensor(sensor_id);
        self.deliver("sensor", recipients, frame).await
    }

    async fn deliver(
        &self,
        scope: &'static str,
        recipients: Vec<Recipient>,
        frame: &ServerFrame,
    ) -> DeliveryReport {
        if recipients.is_empty() {
            return DeliveryReport::default();
        }
        let text: Arc<str> = match frame.to_text() {
            Ok(text) => Arc::from(text),
            Err(err) => {
                error!(target: "iot.realtime", scope, error = %err, "frame_serialize_failed");
                return DeliveryReport::default();
            }
        };

        let sends = recipients.iter().map(|recipient| {
            let text = text.clone();
            async move { (recipient.id, recipient.sink.send(text).await) }
        });
        let results = join_all(sends).await;

        let closing = self.registry.is_closing();
        let mut delivered = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        for (id, result) in results {
            match result {
                Ok(()) => delivered.push(id),
                Err(err) => {
                    if closing {
                        debug!(target: "iot.realtime", scope, connection_id = id.0, error = %err, "delivery_failed_during_shutdown");
                    } else {
                        warn!(target: "iot.realtime", scope, connection_id = id.0, error = %err, "delivery_failed");
                        iot_telemetry::record_failure(FailureKind::Delivery);
                    }
                    failed.push(id);
                }
            }
        }

        self.registry.record_delivered(&delivered);
        self.registry.record_failed(failed.len());
        iot_telemetry::record_fanout_delivered(delivered.len() as u64);
        for id in &failed {
            self.registry.unregister(*id);
        }

        DeliveryReport {
            attempted: recipients.len(),
            delivered: delivered.len(),
            failed: failed.len(),
        }
    }
}

/// 周期性向全部连接发送 `ping`，发送失败的半开连接随之被注销。
pub fn spawn_liveness_probe(
    dispatcher: FanoutDispatcher,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即返回，跳过。
        ticker.tick().await;
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    let frame = ServerFrame::Ping { timestamp: now_rfc3339() };
                    let report = dispatcher.broadcast(&frame, &[]).await;
                    debug!(
                        target: "iot.realtime",
                        attempted = report.attempted,
                        failed = report.failed,
                        "liveness_probe"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(target: "iot.realtime", "liveness_probe_stopped");
    })
}
