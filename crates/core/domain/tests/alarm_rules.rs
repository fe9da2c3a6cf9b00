use domain::{AlarmRuleSet, Comparison, DeviceStatus, Severity};

#[test]
fn rule_set_parses_stored_json() {
    let raw = r#"{
        "enabled": true,
        "rules": [
            {"name": "high", "condition": ">", "threshold": 35, "severity": "warning"},
            {"condition": "<=", "threshold": 5.5, "enabled": false}
        ]
    }"#;
    let set: AlarmRuleSet = serde_json::from_str(raw).expect("rules");
    assert!(set.enabled);
    assert_eq!(set.rules.len(), 2);
    assert_eq!(set.rules[0].condition, Comparison::Gt);
    assert_eq!(set.rules[0].severity, Severity::Warning);
    assert_eq!(set.rules[1].name, "unnamed rule");
    assert_eq!(set.rules[1].severity, Severity::Info);
    assert!(!set.rules[1].enabled);
}

#[test]
fn unknown_operator_is_rejected() {
    let raw = r#"{"rules": [{"condition": "=~", "threshold": 1}]}"#;
    assert!(serde_json::from_str::<AlarmRuleSet>(raw).is_err());
}

#[test]
fn comparison_boundaries() {
    assert!(!Comparison::Gt.holds(35.0, 35.0));
    assert!(Comparison::Ge.holds(35.0, 35.0));
    assert!(Comparison::Ne.holds(1.0, 2.0));
}

#[test]
fn status_parse_is_case_insensitive() {
    assert_eq!(DeviceStatus::parse("Online"), Some(DeviceStatus::Online));
    assert_eq!(DeviceStatus::parse(" error "), Some(DeviceStatus::Error));
    assert_eq!(DeviceStatus::parse("rebooting"), None);
}
