use domain::Severity;
use iot_alarm::{default_rules_for, evaluate, evaluate_rules, parse_rule_set};
use iot_storage::SensorRecord;
use serde_json::json;

fn sensor_with_rules(rules: serde_json::Value) -> SensorRecord {
    let mut sensor = SensorRecord::new(3, "Boiler", "TEMP_001");
    sensor.alarm_rules = Some(rules);
    sensor
}

fn greater_than(op: &str) -> SensorRecord {
    sensor_with_rules(json!({
        "enabled": true,
        "rules": [{"name": "high", "condition": op, "threshold": 35, "severity": "warning"}]
    }))
}

#[test]
fn strict_greater_than() {
    let sensor = greater_than(">");
    let events = evaluate(&sensor, 40.0);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].rule_name, "high");
    assert_eq!(events[0].condition, "40 > 35");
    assert_eq!(events[0].severity, Severity::Warning);
    assert_eq!(events[0].value, 40.0);
    assert_eq!(events[0].threshold, 35.0);
    assert_eq!(events[0].message, "sensor Boiler triggered alarm condition");

    assert!(evaluate(&sensor, 30.0).is_empty());
    assert!(evaluate(&sensor, 35.0).is_empty());
}

#[test]
fn greater_or_equal_fires_on_threshold() {
    let sensor = greater_than(">=");
    assert_eq!(evaluate(&sensor, 35.0).len(), 1);
}

#[test]
fn several_rules_fire_independently() {
    let sensor = sensor_with_rules(json!({
        "rules": [
            {"name": "a", "condition": ">", "threshold": 10},
            {"name": "b", "condition": "!=", "threshold": 0, "message": "non-zero"},
            {"name": "c", "condition": "<", "threshold": 10},
            {"name": "d", "condition": ">", "threshold": 1, "enabled": false}
        ]
    }));
    let events = evaluate(&sensor, 12.5);
    let names: Vec<&str> = events.iter().map(|event| event.rule_name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(events[1].message, "non-zero");
    assert_eq!(events[0].severity, Severity::Info);
}

#[test]
fn disabled_sensor_or_set_produces_nothing() {
    let mut sensor = greater_than(">");
    sensor.alarm_enabled = false;
    assert!(evaluate(&sensor, 99.0).is_empty());

    let sensor = sensor_with_rules(json!({
        "enabled": false,
        "rules": [{"condition": ">", "threshold": 1}]
    }));
    assert!(evaluate(&sensor, 99.0).is_empty());

    let sensor = SensorRecord::new(1, "No rules", "X");
    assert!(evaluate(&sensor, 99.0).is_empty());
}

#[test]
fn malformed_rule_is_skipped() {
    let rule_set = parse_rule_set(&json!({
        "rules": [
            {"condition": "~", "threshold": 1},
            {"condition": ">"},
            {"name": "ok", "condition": "<=", "threshold": 1}
        ]
    }));
    assert_eq!(rule_set.rules.len(), 1);
    assert_eq!(rule_set.rules[0].name, "ok");
    assert!(!parse_rule_set(&json!("garbage")).enabled);
}

#[test]
fn default_rules_by_sensor_type() {
    let temperature = default_rules_for("temperature").expect("rules");
    let sensor = SensorRecord::new(1, "Room", "TEMP_002");
    assert_eq!(evaluate_rules(&sensor, &temperature, 36.0).len(), 1);
    assert_eq!(evaluate_rules(&sensor, &temperature, 4.0).len(), 1);
    assert!(evaluate_rules(&sensor, &temperature, 20.0).is_empty());

    let humidity = default_rules_for("湿度传感器").expect("rules");
    let events = evaluate_rules(&sensor, &humidity, 10.0);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, Severity::Info);

    assert!(default_rules_for("pressure").is_none());
}
