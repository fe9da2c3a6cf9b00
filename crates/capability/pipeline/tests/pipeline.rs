use async_trait::async_trait;
use domain::{DeviceStatus, RawEvent};
use iot_ingest::FrameHandler;
use iot_pipeline::{IngestPipeline, PersistOutcome, PersistenceWriter, PipelineOutcome};
use iot_realtime::{ConnectionRegistry, ConnectionSink, FanoutDispatcher, RealtimeError};
use iot_storage::{
    CachePolicy, GatewayRecord, GatewayStore, InMemoryGatewayStore, InMemoryReadingCache,
    InMemoryReadingStore, InMemorySensorStore, ReadingCache, ReadingPoint, ReadingStore,
    SensorRecord, SensorStore, StorageError,
};
use iot_telemetry::FailureKind;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingSink {
    frames: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn frames(&self) -> Vec<Value> {
        self.frames
            .lock()
            .expect("frames lock")
            .iter()
            .map(|text| serde_json::from_str(text).expect("json frame"))
            .collect()
    }

    fn types(&self) -> Vec<String> {
        self.frames()
            .iter()
            .map(|frame| frame["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl ConnectionSink for RecordingSink {
    async fn send(&self, text: Arc<str>) -> Result<(), RealtimeError> {
        self.frames
            .lock()
            .expect("frames lock")
            .push(text.to_string());
        Ok(())
    }

    fn close(&self) {}
}

struct FailingReadingStore;

#[async_trait]
impl ReadingStore for FailingReadingStore {
    async fn append(&self, _point: &ReadingPoint) -> Result<(), StorageError> {
        Err(StorageError::new("time-series store unavailable"))
    }

    async fn list_recent(
        &self,
        _device_id: &str,
        _limit: usize,
    ) -> Result<Vec<ReadingPoint>, StorageError> {
        Ok(Vec::new())
    }
}

struct UnreachableSensorStore;

#[async_trait]
impl SensorStore for UnreachableSensorStore {
    async fn find_by_device_id(
        &self,
        _device_id: &str,
    ) -> Result<Option<SensorRecord>, StorageError> {
        Err(StorageError::new("relational store unavailable"))
    }

    async fn record_reading(
        &self,
        _device_id: &str,
        _value: &str,
        _at_ms: i64,
    ) -> Result<bool, StorageError> {
        Err(StorageError::new("relational store unavailable"))
    }

    async fn update_status(
        &self,
        _device_id: &str,
        _status: DeviceStatus,
        _error: Option<&str>,
        _at_ms: i64,
    ) -> Result<Option<SensorRecord>, StorageError> {
        Err(StorageError::new("relational store unavailable"))
    }
}

struct Harness {
    sensors: Arc<InMemorySensorStore>,
    gateways: Arc<InMemoryGatewayStore>,
    readings: Arc<InMemoryReadingStore>,
    cache: Arc<InMemoryReadingCache>,
    client: Arc<RecordingSink>,
    pipeline: IngestPipeline,
}

fn thermometer() -> SensorRecord {
    let mut sensor = SensorRecord::new(7, "boiler room", "TEMP_001");
    sensor.sensor_type = Some("temperature".to_string());
    sensor.location = Some("B1".to_string());
    sensor.unit = Some("°C".to_string());
    sensor.gateway_id = Some(1);
    sensor.alarm_rules = Some(json!({
        "enabled": true,
        "rules": [
            {"name": "high temperature", "condition": ">", "threshold": 35.0, "severity": "warning"}
        ]
    }));
    sensor
}

fn harness() -> Harness {
    let sensors = Arc::new(InMemorySensorStore::with_sensors([thermometer()]));
    let gateways = Arc::new(InMemoryGatewayStore::with_gateways([GatewayRecord::new(
        1, "north", "GW_001",
    )]));
    let readings = Arc::new(InMemoryReadingStore::new());
    let cache = Arc::new(InMemoryReadingCache::new(CachePolicy::default()));

    let registry = Arc::new(ConnectionRegistry::new());
    let client = Arc::new(RecordingSink::default());
    registry
        .register(client.clone(), None, None)
        .expect("register client");
    let dispatcher = FanoutDispatcher::new(registry);

    let pipeline = IngestPipeline::new(
        sensors.clone(),
        gateways.clone(),
        readings.clone(),
        cache.clone(),
        dispatcher,
    );
    Harness {
        sensors,
        gateways,
        readings,
        cache,
        client,
        pipeline,
    }
}

fn frame(topic: &str, payload: Value) -> RawEvent {
    RawEvent {
        topic: topic.to_string(),
        payload: payload.to_string().into_bytes(),
        received_at_ms: 1_704_067_200_000,
    }
}

#[tokio::test]
async fn known_sensor_reading_persists_once_and_fans_out() {
    let h = harness();
    let outcome = h
        .pipeline
        .process(&frame(
            "sensors/TEMP_001/data",
            json!({"value": 21.5, "timestamp": "2024-01-01T00:00:00Z"}),
        ))
        .await;
    assert_eq!(outcome, PipelineOutcome::Processed);

    let sensor = h
        .sensors
        .find_by_device_id("TEMP_001")
        .await
        .expect("lookup")
        .expect("sensor");
    assert_eq!(sensor.data_points_count, 1);
    assert_eq!(sensor.last_value.as_deref(), Some("21.5"));
    assert_eq!(sensor.status, DeviceStatus::Online);

    assert_eq!(h.readings.len(), 1);
    let stored = h
        .readings
        .list_recent("TEMP_001", 10)
        .await
        .expect("list");
    assert_eq!(stored[0].location, "B1");
    assert_eq!(stored[0].sensor_type, "temperature");
    assert_eq!(stored[0].reading.ts_ms, 1_704_067_200_000);

    let series = h.cache.series(7).await.expect("series");
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].value, 21.5);

    let frames = h.client.frames();
    assert_eq!(h.client.types(), vec!["sensor_data"]);
    assert_eq!(frames[0]["sensor_id"], 7);
    assert_eq!(frames[0]["value"], 21.5);
    assert_eq!(frames[0]["quality"], "good");
    assert_eq!(frames[0]["sensor_name"], "boiler room");
}

#[tokio::test]
async fn reading_over_threshold_raises_alarm_after_data() {
    let h = harness();
    let outcome = h
        .pipeline
        .process(&frame("sensors/TEMP_001/data", json!({"value": 40})))
        .await;
    assert_eq!(outcome, PipelineOutcome::Processed);

    assert_eq!(h.client.types(), vec!["sensor_data", "alarm"]);
    let alarm = &h.client.frames()[1]["data"];
    assert_eq!(alarm["rule_name"], "high temperature");
    assert_eq!(alarm["condition"], "40 > 35");
    assert_eq!(alarm["severity"], "warning");
    assert_eq!(alarm["threshold"], 35.0);
}

#[tokio::test]
async fn unknown_sensor_has_no_side_effects() {
    let h = harness();
    let outcome = h
        .pipeline
        .process(&frame("sensors/GHOST/data", json!({"value": 40})))
        .await;
    assert_eq!(outcome, PipelineOutcome::Dropped(FailureKind::UnknownDevice));
    assert!(h.readings.is_empty());
    assert!(h.cache.latest(7).await.expect("latest").is_none());
    assert!(h.client.types().is_empty());
}

#[tokio::test]
async fn malformed_payloads_are_dropped() {
    let h = harness();
    let missing_value = h
        .pipeline
        .process(&frame("sensors/TEMP_001/data", json!({"quality": "good"})))
        .await;
    let unknown_topic = h
        .pipeline
        .process(&frame("sensors/TEMP_001/config", json!({})))
        .await;
    assert_eq!(missing_value, PipelineOutcome::Dropped(FailureKind::MalformedMessage));
    assert_eq!(unknown_topic, PipelineOutcome::Dropped(FailureKind::MalformedMessage));
    assert!(h.readings.is_empty());
    assert!(h.client.types().is_empty());
}

#[tokio::test]
async fn frame_handler_reports_drops_as_errors() {
    let h = harness();
    assert!(
        h.pipeline
            .handle(frame("sensors/TEMP_001/data", json!({"value": 1})))
            .await
            .is_ok()
    );
    assert!(
        h.pipeline
            .handle(frame("sensors/GHOST/data", json!({"value": 1})))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn status_and_heartbeat_update_devices() {
    let h = harness();
    let outcomes = [
        h.pipeline
            .process(&frame(
                "sensors/TEMP_001/status",
                json!({"status": "error", "error": "probe disconnected"}),
            ))
            .await,
        h.pipeline
            .process(&frame("gateways/GW_001/heartbeat", json!({"uptime": 3600})))
            .await,
        h.pipeline
            .process(&frame("gateways/GW_001/status", json!({"status": "warning"})))
            .await,
        h.pipeline
            .process(&frame("system/power/alert", json!({"level": "critical"})))
            .await,
    ];
    assert!(outcomes.iter().all(|o| *o == PipelineOutcome::Processed));

    let sensor = h
        .sensors
        .find_by_device_id("TEMP_001")
        .await
        .expect("lookup")
        .expect("sensor");
    assert_eq!(sensor.status, DeviceStatus::Error);
    assert_eq!(sensor.error_count, 1);
    assert_eq!(sensor.last_error.as_deref(), Some("probe disconnected"));

    let gateway = h
        .gateways
        .find_by_device_id("GW_001")
        .await
        .expect("lookup")
        .expect("gateway");
    assert_eq!(gateway.status, DeviceStatus::Warning);
    assert_eq!(gateway.uptime_seconds, 3600);

    assert_eq!(
        h.client.types(),
        vec!["sensor_status", "gateway_heartbeat", "gateway_status", "alert"]
    );
    let frames = h.client.frames();
    assert_eq!(frames[0]["error"], "probe disconnected");
    assert_eq!(frames[3]["source"], "power");
    assert_eq!(frames[3]["data"], json!({"level": "critical"}));
}

#[tokio::test]
async fn series_failure_does_not_roll_back_device_update() {
    let sensors = Arc::new(InMemorySensorStore::with_sensors([thermometer()]));
    let cache = Arc::new(InMemoryReadingCache::new(CachePolicy::default()));
    let writer = PersistenceWriter::new(sensors.clone(), Arc::new(FailingReadingStore), cache.clone());

    let sensor = thermometer();
    let payload = iot_normalize::SensorDataPayload {
        value: 22.0,
        value_text: "22".to_string(),
        ts_ms: 1_704_067_200_000,
        quality: "good".to_string(),
    };
    let outcome = writer.write_reading(&sensor, &payload, 1_704_067_200_500).await;

    assert_eq!(
        outcome,
        PersistOutcome {
            device_updated: true,
            series_written: false,
            cache_refreshed: true,
        }
    );
    assert!(!outcome.is_complete());
    let stored = sensors
        .find_by_device_id("TEMP_001")
        .await
        .expect("lookup")
        .expect("sensor");
    assert_eq!(stored.data_points_count, 1);
    assert!(cache.latest(7).await.expect("latest").is_some());
}

#[tokio::test]
async fn lookup_failure_counts_as_failed_frame() {
    let registry = Arc::new(ConnectionRegistry::new());
    let pipeline = IngestPipeline::new(
        Arc::new(UnreachableSensorStore),
        Arc::new(InMemoryGatewayStore::new()),
        Arc::new(InMemoryReadingStore::new()),
        Arc::new(InMemoryReadingCache::new(CachePolicy::default())),
        FanoutDispatcher::new(registry),
    );
    let before = iot_telemetry::metrics().snapshot();

    let outcome = pipeline
        .process(&frame("sensors/TEMP_001/data", json!({"value": 1})))
        .await;

    assert_eq!(outcome, PipelineOutcome::Dropped(FailureKind::Persistence));
    let after = iot_telemetry::metrics().snapshot();
    // 计数器进程级共享，其他并行用例也会累加。
    assert!(after.frames_failed > before.frames_failed);
    assert!(after.persist_failures > before.persist_failures);
}
