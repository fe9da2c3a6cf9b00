use domain::{DeviceStatus, Reading};
use iot_storage::{
    GatewayRecord, GatewayStore, InMemoryGatewayStore, InMemoryReadingStore, InMemorySensorStore,
    ReadingPoint, ReadingStore, SensorRecord, SensorStore,
};

fn sample_sensor() -> SensorRecord {
    let mut sensor = SensorRecord::new(7, "Boiler temperature", "TEMP_001");
    sensor.sensor_type = Some("temperature".to_string());
    sensor.unit = Some("°C".to_string());
    sensor.gateway_id = Some(1);
    sensor
}

#[tokio::test]
async fn record_reading_updates_single_row() {
    let store = InMemorySensorStore::with_sensors([sample_sensor()]);

    assert!(store.record_reading("TEMP_001", "23.5", 1_000).await.expect("write"));
    assert!(store.record_reading("TEMP_001", "24", 2_000).await.expect("write"));

    let sensor = store
        .find_by_device_id("TEMP_001")
        .await
        .expect("find")
        .expect("sensor");
    assert_eq!(sensor.last_value.as_deref(), Some("24"));
    assert_eq!(sensor.last_data_time_ms, Some(2_000));
    assert_eq!(sensor.data_points_count, 2);
    assert_eq!(sensor.status, DeviceStatus::Online);
}

#[tokio::test]
async fn record_reading_unknown_device_is_noop() {
    let store = InMemorySensorStore::new();
    assert!(!store.record_reading("MISSING", "1", 1_000).await.expect("write"));
    assert!(store.find_by_device_id("MISSING").await.expect("find").is_none());
}

#[tokio::test]
async fn update_status_counts_errors_only_when_given() {
    let store = InMemorySensorStore::with_sensors([sample_sensor()]);

    let sensor = store
        .update_status("TEMP_001", DeviceStatus::Warning, None, 1_000)
        .await
        .expect("update")
        .expect("sensor");
    assert_eq!(sensor.status, DeviceStatus::Warning);
    assert_eq!(sensor.error_count, 0);

    let sensor = store
        .update_status("TEMP_001", DeviceStatus::Error, Some("probe disconnected"), 2_000)
        .await
        .expect("update")
        .expect("sensor");
    assert_eq!(sensor.error_count, 1);
    assert_eq!(sensor.last_error.as_deref(), Some("probe disconnected"));
    assert_eq!(sensor.last_error_time_ms, Some(2_000));
}

#[tokio::test]
async fn heartbeat_sets_online_and_keeps_uptime_when_absent() {
    let store = InMemoryGatewayStore::with_gateways([GatewayRecord::new(1, "Gateway A", "GW_001")]);

    let gateway = store
        .record_heartbeat("GW_001", Some(3_600), 1_000)
        .await
        .expect("heartbeat")
        .expect("gateway");
    assert_eq!(gateway.status, DeviceStatus::Online);
    assert_eq!(gateway.uptime_seconds, 3_600);

    let gateway = store
        .record_heartbeat("GW_001", None, 2_000)
        .await
        .expect("heartbeat")
        .expect("gateway");
    assert_eq!(gateway.last_seen_ms, Some(2_000));
    assert_eq!(gateway.uptime_seconds, 3_600);

    let gateway = store
        .update_status("GW_001", DeviceStatus::Offline)
        .await
        .expect("status")
        .expect("gateway");
    assert_eq!(gateway.status, DeviceStatus::Offline);
    assert!(store.update_status("GW_404", DeviceStatus::Online).await.expect("status").is_none());
}

#[tokio::test]
async fn readings_list_most_recent_first() {
    let store = InMemoryReadingStore::new();
    let sensor = sample_sensor();
    for (ts_ms, value) in [(1_000, 20.0), (3_000, 22.0), (2_000, 21.0)] {
        let point = ReadingPoint::for_sensor(
            &sensor,
            Reading {
                device_id: sensor.device_id.clone(),
                ts_ms,
                value,
                quality: "good".to_string(),
            },
        );
        store.append(&point).await.expect("append");
    }

    let recent = store.list_recent("TEMP_001", 2).await.expect("list");
    let values: Vec<f64> = recent.iter().map(|point| point.reading.value).collect();
    assert_eq!(values, vec![22.0, 21.0]);
    assert_eq!(recent[0].location, "unknown");
    assert_eq!(recent[0].sensor_type, "temperature");
    assert_eq!(store.len(), 3);
}
