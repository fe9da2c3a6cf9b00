use serde::{Deserialize, Serialize};

/// MQTT 输入原始帧。
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at_ms: i64,
}

/// 设备种类（传感器 / 网关）。设备标识在同一种类内唯一。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Sensor,
    Gateway,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Sensor => "sensor",
            DeviceKind::Gateway => "gateway",
        }
    }
}

/// 设备在线状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Offline,
    Online,
    Warning,
    Error,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Offline => "offline",
            DeviceStatus::Online => "online",
            DeviceStatus::Warning => "warning",
            DeviceStatus::Error => "error",
        }
    }

    /// 解析状态字符串（大小写不敏感），未知值返回 None。
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "offline" => Some(DeviceStatus::Offline),
            "online" => Some(DeviceStatus::Online),
            "warning" => Some(DeviceStatus::Warning),
            "error" => Some(DeviceStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 传感器读数：写入时序库后不可变。
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub device_id: String,
    pub ts_ms: i64,
    pub value: f64,
    pub quality: String,
}
