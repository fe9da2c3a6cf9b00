use iot_telemetry::{
    FailureKind, TelemetryMetrics, metrics, new_request_ids, record_failure, record_frame_dropped,
};

#[test]
fn request_ids_non_empty() {
    let ids = new_request_ids();
    assert!(!ids.request_id.is_empty());
    assert!(!ids.trace_id.is_empty());
    assert_ne!(ids.request_id, ids.trace_id);
}

#[test]
fn fresh_metrics_start_at_zero() {
    let metrics = TelemetryMetrics::new();
    assert_eq!(metrics.snapshot(), Default::default());
}

#[test]
fn failure_kind_names_are_snake_case() {
    assert_eq!(FailureKind::UnknownDevice.as_str(), "unknown_device");
    assert_eq!(FailureKind::MalformedMessage.to_string(), "malformed_message");
    assert_eq!(
        serde_json::to_value(FailureKind::TransientIo).expect("json"),
        serde_json::json!("transient_io")
    );
}

// 全局计数器只在本测试中改动，可以按差值精确断言。
#[test]
fn every_dropped_frame_counts_as_failed() {
    let before = metrics().snapshot();
    record_frame_dropped(FailureKind::MalformedMessage);
    record_frame_dropped(FailureKind::UnknownDevice);
    record_frame_dropped(FailureKind::Persistence);
    record_failure(FailureKind::Persistence);
    let after = metrics().snapshot();

    assert_eq!(after.frames_failed - before.frames_failed, 3);
    assert_eq!(after.dropped_malformed - before.dropped_malformed, 1);
    assert_eq!(after.dropped_unknown_device - before.dropped_unknown_device, 1);
    assert_eq!(after.persist_failures - before.persist_failures, 2);
}
