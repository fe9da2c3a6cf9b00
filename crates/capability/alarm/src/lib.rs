//! 报警评估：对一次读数逐条应用传感器的阈值规则。
//!
//! 评估无状态：不去重、不限频，同一读数可命中多条规则，每条命中规则产生一个事件。

use domain::{AlarmEvent, AlarmRule, AlarmRuleSet, Comparison, Severity};
use iot_storage::SensorRecord;
use serde::Deserialize;
use tracing::warn;

#[derive(Deserialize)]
struct LooseRuleSet {
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    rules: Vec<serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

/// 解析传感器上保存的规则 JSON。
///
/// 单条规则格式错误时跳过该条并记录，其余规则照常生效。
pub fn parse_rule_set(raw: &serde_json::Value) -> AlarmRuleSet {
    let loose = match LooseRuleSet::deserialize(raw) {
        Ok(loose) => loose,
        Err(err) => {
            warn!(target: "iot.alarm", error = %err, "alarm_rules_invalid");
            return AlarmRuleSet {
                enabled: false,
                rules: Vec::new(),
            };
        }
    };
    let mut rules = Vec::with_capacity(loose.rules.len());
    for (index, rule) in loose.rules.into_iter().enumerate() {
        match serde_json::from_value::<AlarmRule>(rule) {
            Ok(rule) => rules.push(rule),
            Err(err) => {
                warn!(target: "iot.alarm", index, error = %err, "alarm_rule_skipped");
            }
        }
    }
    AlarmRuleSet {
        enabled: loose.enabled,
        rules,
    }
}

/// 对传感器的规则集评估一个读数。
pub fn evaluate(sensor: &SensorRecord, value: f64) -> Vec<AlarmEvent> {
    if !sensor.alarm_enabled {
        return Vec::new();
    }
    let Some(raw) = sensor.alarm_rules.as_ref() else {
        return Vec::new();
    };
    evaluate_rules(sensor, &parse_rule_set(raw), value)
}

/// 对已解析的规则集评估一个读数。
pub fn evaluate_rules(sensor: &SensorRecord, rule_set: &AlarmRuleSet, value: f64) -> Vec<AlarmEvent> {
    if !rule_set.enabled {
        return Vec::new();
    }
    rule_set
        .rules
        .iter()
        .filter(|rule| rule.enabled && rule.condition.holds(value, rule.threshold))
        .map(|rule| AlarmEvent {
            rule_name: rule.name.clone(),
            condition: format!("{} {} {}", value, rule.condition.as_str(), rule.threshold),
            severity: rule.severity,
            message: rule
                .message
                .clone()
                .unwrap_or_else(|| format!("sensor {} triggered alarm condition", sensor.name)),
            sensor_id: sensor.id,
            device_id: sensor.device_id.clone(),
            sensor_name: sensor.name.clone(),
            value,
            threshold: rule.threshold,
        })
        .collect()
}

fn rule(name: &str, condition: Comparison, threshold: f64, severity: Severity) -> AlarmRule {
    AlarmRule {
        name: name.to_string(),
        condition,
        threshold,
        severity,
        enabled: true,
        message: None,
    }
}

/// 按传感器类型给出默认规则集（供建档方预置），未知类型返回 None。
pub fn default_rules_for(sensor_type: &str) -> Option<AlarmRuleSet> {
    let rules = match sensor_type.trim().to_ascii_lowercase().as_str() {
        "temperature" | "温度传感器" => vec![
            rule("high temperature", Comparison::Gt, 35.0, Severity::Warning),
            rule("low temperature", Comparison::Lt, 5.0, Severity::Warning),
        ],
        "humidity" | "湿度传感器" => vec![
            rule("high humidity", Comparison::Gt, 80.0, Severity::Warning),
            rule("low humidity", Comparison::Lt, 20.0, Severity::Info),
        ],
        _ => return None,
    };
    Some(AlarmRuleSet {
        enabled: true,
        rules,
    })
}
