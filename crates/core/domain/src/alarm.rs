//! 报警规则与报警事件。
//!
//! 规则以 JSON 形式挂在传感器记录上：
//! `{"enabled": true, "rules": [{"name": "...", "condition": ">", "threshold": 35.0, ...}]}`

use serde::{Deserialize, Serialize};

/// 比较运算符。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Lt => "<",
            Comparison::Ge => ">=",
            Comparison::Le => "<=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }

    /// `value <op> threshold`
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Gt => value > threshold,
            Comparison::Lt => value < threshold,
            Comparison::Ge => value >= threshold,
            Comparison::Le => value <= threshold,
            Comparison::Eq => value == threshold,
            Comparison::Ne => value != threshold,
        }
    }
}

/// 报警级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

fn default_true() -> bool {
    true
}

fn default_rule_name() -> String {
    "unnamed rule".to_string()
}

/// 单条阈值规则。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRule {
    #[serde(default = "default_rule_name")]
    pub name: String,
    pub condition: Comparison,
    pub threshold: f64,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// 传感器上的规则集合。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRuleSet {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<AlarmRule>,
}

impl Default for AlarmRuleSet {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: Vec::new(),
        }
    }
}

/// 触发的报警事件（每条命中规则一条）。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmEvent {
    pub rule_name: String,
    pub condition: String,
    pub severity: Severity,
    pub message: String,
    pub sensor_id: i64,
    pub device_id: String,
    pub sensor_name: String,
    pub value: f64,
    pub threshold: f64,
}
