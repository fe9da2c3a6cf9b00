//! 存储层数据模型

use domain::{DeviceKind, DeviceStatus, Reading};
use serde::{Deserialize, Serialize};

/// 传感器记录（关系库 `sensors` 表，连接 `sensor_types`）。
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    pub id: i64,
    pub name: String,
    pub device_id: String,
    pub gateway_id: Option<i64>,
    pub location: Option<String>,
    pub sensor_type: Option<String>,
    pub unit: Option<String>,
    pub alarm_enabled: bool,
    /// 原样保存的规则 JSON：`{"enabled": bool, "rules": [...]}`。
    pub alarm_rules: Option<serde_json::Value>,
    pub status: DeviceStatus,
    pub last_value: Option<String>,
    pub last_data_time_ms: Option<i64>,
    pub data_points_count: i64,
    pub error_count: i64,
    pub last_error: Option<String>,
    pub last_error_time_ms: Option<i64>,
}

impl SensorRecord {
    /// 新建离线传感器记录，计数归零。
    pub fn new(id: i64, name: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            device_id: device_id.into(),
            gateway_id: None,
            location: None,
            sensor_type: None,
            unit: None,
            alarm_enabled: true,
            alarm_rules: None,
            status: DeviceStatus::Offline,
            last_value: None,
            last_data_time_ms: None,
            data_points_count: 0,
            error_count: 0,
            last_error: None,
            last_error_time_ms: None,
        }
    }
}

/// 网关记录（关系库 `gateways` 表）。
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRecord {
    pub id: i64,
    pub name: String,
    pub device_id: String,
    pub status: DeviceStatus,
    pub last_seen_ms: Option<i64>,
    pub uptime_seconds: i64,
}

impl GatewayRecord {
    pub fn new(id: i64, name: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            device_id: device_id.into(),
            status: DeviceStatus::Offline,
            last_seen_ms: None,
            uptime_seconds: 0,
        }
    }
}

/// 时序点：读数加上写入时的设备标签。
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingPoint {
    pub sensor_id: i64,
    pub device_kind: DeviceKind,
    pub sensor_type: String,
    pub gateway_id: Option<i64>,
    pub location: String,
    pub unit: Option<String>,
    pub reading: Reading,
}

impl ReadingPoint {
    /// 按传感器记录打标签，缺失的类型与位置记为 `unknown`。
    pub fn for_sensor(sensor: &SensorRecord, reading: Reading) -> Self {
        Self {
            sensor_id: sensor.id,
            device_kind: DeviceKind::Sensor,
            sensor_type: sensor
                .sensor_type
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            gateway_id: sensor.gateway_id,
            location: sensor
                .location
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            unit: sensor.unit.clone(),
            reading,
        }
    }
}

/// 缓存条目：`sensor:{id}:latest` 的值，同时作为 `sensor:{id}:series` 的列表元素。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: f64,
    /// RFC 3339 时间。
    pub timestamp: String,
    pub sensor_id: i64,
    pub device_id: String,
}
