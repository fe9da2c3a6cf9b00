//! 读数持久化。

use api_contract::rfc3339_from_ms;
use domain::Reading;
use iot_normalize::SensorDataPayload;
use iot_storage::{CacheEntry, ReadingCache, ReadingPoint, ReadingStore, SensorRecord, SensorStore};
use iot_telemetry::FailureKind;
use std::sync::Arc;
use tracing::warn;

/// 一次写入中各步骤是否成功。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    pub device_updated: bool,
    pub series_written: bool,
    pub cache_refreshed: bool,
}

impl PersistOutcome {
    pub fn is_complete(&self) -> bool {
        self.device_updated && self.series_written && self.cache_refreshed
    }
}

/// 把一条已解析的读数写入设备状态、时序库与缓存。
#[derive(Clone)]
pub struct PersistenceWriter {
    sensors: Arc<dyn SensorStore>,
    readings: Arc<dyn ReadingStore>,
    cache: Arc<dyn ReadingCache>,
}

impl PersistenceWriter {
    pub fn new(
        sensors: Arc<dyn SensorStore>,
        readings: Arc<dyn ReadingStore>,
        cache: Arc<dyn ReadingCache>,
    ) -> Self {
        Self {
            sensors,
            readings,
            cache,
        }
    }

    /// 三步互不回滚：某步失败记录后继续执行下一步。
    pub async fn write_reading(
        &self,
        sensor: &SensorRecord,
        payload: &SensorDataPayload,
        at_ms: i64,
    ) -> PersistOutcome {
        let mut outcome = PersistOutcome::default();

        match self
            .sensors
            .record_reading(&sensor.device_id, &payload.value_text, at_ms)
            .await
        {
            Ok(true) => outcome.device_updated = true,
            Ok(false) => {
                warn!(
                    target: "iot.pipeline",
                    device_id = %sensor.device_id,
                    "device_vanished_before_update"
                );
            }
            Err(err) => persist_failed("device_update", sensor, &err),
        }

        let reading = Reading {
            device_id: sensor.device_id.clone(),
            ts_ms: payload.ts_ms,
            value: payload.value,
            quality: payload.quality.clone(),
        };
        let point = ReadingPoint::for_sensor(sensor, reading);
        match self.readings.append(&point).await {
            Ok(()) => outcome.series_written = true,
            Err(err) => persist_failed("series_write", sensor, &err),
        }

        let entry = CacheEntry {
            value: payload.value,
            timestamp: rfc3339_from_ms(payload.ts_ms),
            sensor_id: sensor.id,
            device_id: sensor.device_id.clone(),
        };
        match self.cache.refresh(&entry).await {
            Ok(()) => outcome.cache_refreshed = true,
            Err(err) => persist_failed("cache_refresh", sensor, &err),
        }

        outcome
    }
}

fn persist_failed(step: &'static str, sensor: &SensorRecord, err: &dyn std::fmt::Display) {
    warn!(
        target: "iot.pipeline",
        step,
        sensor_id = sensor.id,
        device_id = %sensor.device_id,
        error = %err,
        "persist_failed"
    );
    iot_telemetry::record_failure(FailureKind::Persistence);
}
