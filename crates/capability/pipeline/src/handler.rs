//! 入站帧处理：每帧由接入层在独立任务中调用。

use crate::PipelineError;
use crate::writer::PersistenceWriter;
use api_contract::{ServerFrame, now_rfc3339, rfc3339_from_ms};
use async_trait::async_trait;
use domain::{DeviceKind, RawEvent};
use iot_ingest::{FrameHandler, IngestError};
use iot_normalize::{
    HeartbeatPayload, InboundMessage, SensorDataPayload, StatusPayload, route,
};
use iot_realtime::FanoutDispatcher;
use iot_storage::{GatewayStore, ReadingCache, ReadingStore, SensorStore};
use iot_telemetry::FailureKind;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 单帧处理结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Processed,
    Dropped(FailureKind),
}

/// 入站流水线。
#[derive(Clone)]
pub struct IngestPipeline {
    sensors: Arc<dyn SensorStore>,
    gateways: Arc<dyn GatewayStore>,
    writer: PersistenceWriter,
    dispatcher: FanoutDispatcher,
}

impl IngestPipeline {
    pub fn new(
        sensors: Arc<dyn SensorStore>,
        gateways: Arc<dyn GatewayStore>,
        readings: Arc<dyn ReadingStore>,
        cache: Arc<dyn ReadingCache>,
        dispatcher: FanoutDispatcher,
    ) -> Self {
        let writer = PersistenceWriter::new(sensors.clone(), readings, cache);
        Self {
            sensors,
            gateways,
            writer,
            dispatcher,
        }
    }

    /// 处理一帧。丢弃的帧不重试，只计数与记录。
    pub async fn process(&self, frame: &RawEvent) -> PipelineOutcome {
        let result = match route(frame) {
            Ok(message) => self.apply(message, frame.received_at_ms).await,
            Err(err) => Err(PipelineError::from(err)),
        };
        match result {
            Ok(()) => {
                iot_telemetry::record_frame_processed();
                PipelineOutcome::Processed
            }
            Err(err) => {
                let kind = err.failure_kind();
                warn!(
                    target: "iot.pipeline",
                    topic = %frame.topic,
                    kind = %kind,
                    error = %err,
                    "message_dropped"
                );
                iot_telemetry::record_frame_dropped(kind);
                PipelineOutcome::Dropped(kind)
            }
        }
    }

    async fn apply(&self, message: InboundMessage, at_ms: i64) -> Result<(), PipelineError> {
        debug!(target: "iot.pipeline", kind = message.kind(), "message_routed");
        match message {
            InboundMessage::SensorData { device_id, payload } => {
                self.on_sensor_data(device_id, payload, at_ms).await
            }
            InboundMessage::SensorStatus { device_id, payload } => {
                self.on_sensor_status(device_id, payload, at_ms).await
            }
            InboundMessage::GatewayStatus { device_id, payload } => {
                self.on_gateway_status(device_id, payload, at_ms).await
            }
            InboundMessage::GatewayHeartbeat { device_id, payload } => {
                self.on_gateway_heartbeat(device_id, payload, at_ms).await
            }
            InboundMessage::SystemAlert { source, payload } => {
                let frame = ServerFrame::Alert {
                    source,
                    data: payload,
                    timestamp: now_rfc3339(),
                };
                self.dispatcher.broadcast(&frame, &[]).await;
                Ok(())
            }
        }
    }

    async fn on_sensor_data(
        &self,
        device_id: String,
        payload: SensorDataPayload,
        at_ms: i64,
    ) -> Result<(), PipelineError> {
        let Some(sensor) = self.sensors.find_by_device_id(&device_id).await? else {
            return Err(PipelineError::UnknownDevice {
                kind: DeviceKind::Sensor,
                device_id,
            });
        };

        let outcome = self.writer.write_reading(&sensor, &payload, at_ms).await;
        if !outcome.is_complete() {
            debug!(target: "iot.pipeline", sensor_id = sensor.id, ?outcome, "partial_persist");
        }

        let alarms = iot_alarm::evaluate(&sensor, payload.value);

        let frame = ServerFrame::SensorData {
            sensor_id: sensor.id,
            device_id: sensor.device_id.clone(),
            value: payload.value,
            quality: payload.quality,
            timestamp: rfc3339_from_ms(payload.ts_ms),
            sensor_name: sensor.name.clone(),
            unit: sensor.unit.clone(),
        };
        self.dispatcher
            .broadcast_sensor_data(sensor.id, &frame)
            .await;

        if !alarms.is_empty() {
            iot_telemetry::record_alarms(alarms.len() as u64);
        }
        for alarm in alarms {
            info!(
                target: "iot.alarm",
                sensor_id = alarm.sensor_id,
                rule = %alarm.rule_name,
                condition = %alarm.condition,
                "alarm_raised"
            );
            let frame = ServerFrame::Alarm {
                data: alarm,
                timestamp: now_rfc3339(),
            };
            self.dispatcher.broadcast(&frame, &[]).await;
        }
        Ok(())
    }

    async fn on_sensor_status(
        &self,
        device_id: String,
        payload: StatusPayload,
        at_ms: i64,
    ) -> Result<(), PipelineError> {
        let updated = self
            .sensors
            .update_status(&device_id, payload.status, payload.error.as_deref(), at_ms)
            .await?;
        let Some(sensor) = updated else {
            return Err(PipelineError::UnknownDevice {
                kind: DeviceKind::Sensor,
                device_id,
            });
        };
        let frame = ServerFrame::SensorStatus {
            sensor_id: sensor.id,
            device_id: sensor.device_id,
            status: payload.status.as_str().to_string(),
            error: payload.error,
            timestamp: rfc3339_from_ms(at_ms),
        };
        self.dispatcher.broadcast(&frame, &[]).await;
        Ok(())
    }

    async fn on_gateway_status(
        &self,
        device_id: String,
        payload: StatusPayload,
        at_ms: i64,
    ) -> Result<(), PipelineError> {
        let updated = self
            .gateways
            .update_status(&device_id, payload.status)
            .await?;
        let Some(gateway) = updated else {
            return Err(PipelineError::UnknownDevice {
                kind: DeviceKind::Gateway,
                device_id,
            });
        };
        let frame = ServerFrame::GatewayStatus {
            gateway_id: gateway.id,
            device_id: gateway.device_id,
            status: payload.status.as_str().to_string(),
            timestamp: rfc3339_from_ms(at_ms),
        };
        self.dispatcher.broadcast(&frame, &[]).await;
        Ok(())
    }

    async fn on_gateway_heartbeat(
        &self,
        device_id: String,
        payload: HeartbeatPayload,
        at_ms: i64,
    ) -> Result<(), PipelineError> {
        let updated = self
            .gateways
            .record_heartbeat(&device_id, payload.uptime, at_ms)
            .await?;
        let Some(gateway) = updated else {
            return Err(PipelineError::UnknownDevice {
                kind: DeviceKind::Gateway,
                device_id,
            });
        };
        let frame = ServerFrame::GatewayHeartbeat {
            gateway_id: gateway.id,
            device_id: gateway.device_id,
            uptime: payload.uptime,
            timestamp: rfc3339_from_ms(at_ms),
        };
        self.dispatcher.broadcast(&frame, &[]).await;
        Ok(())
    }
}

#[async_trait]
impl FrameHandler for IngestPipeline {
    async fn handle(&self, frame: RawEvent) -> Result<(), IngestError> {
        match self.process(&frame).await {
            PipelineOutcome::Processed => Ok(()),
            PipelineOutcome::Dropped(kind) => Err(IngestError::Handler(kind.to_string())),
        }
    }
}
