//! 报文路由：按 topic 形状分类，提取设备标识，按报文种类做类型化解析。
//!
//! topic 形状固定为 `{root}/{id}/{suffix}`，设备标识取第 2 段：
//!
//! | topic | 报文 |
//! |---|---|
//! | `sensors/{id}/data` | `SensorData` |
//! | `sensors/{id}/status` | `SensorStatus` |
//! | `gateways/{id}/heartbeat` | `GatewayHeartbeat` |
//! | `gateways/{id}/status` | `GatewayStatus` |
//! | `system/{id}/alert` | `SystemAlert` |
//!
//! 解析失败一律丢弃，不重试；重投只依赖传输层自身的投递保证。

mod payload;

pub use payload::{HeartbeatPayload, SensorDataPayload, StatusPayload};

use domain::RawEvent;
use iot_telemetry::FailureKind;

/// 路由错误。
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RouteError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("invalid json payload: {0}")]
    InvalidJson(String),
    #[error("payload must be a json object")]
    NotAnObject,
    #[error("missing value field")]
    MissingValue,
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("unknown status: {0}")]
    UnknownStatus(String),
}

impl RouteError {
    /// 路由错误都归为报文格式问题。
    pub fn failure_kind(&self) -> FailureKind {
        FailureKind::MalformedMessage
    }
}

/// 已分类、已校验的入站报文。
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    SensorData {
        device_id: String,
        payload: SensorDataPayload,
    },
    SensorStatus {
        device_id: String,
        payload: StatusPayload,
    },
    GatewayHeartbeat {
        device_id: String,
        payload: HeartbeatPayload,
    },
    GatewayStatus {
        device_id: String,
        payload: StatusPayload,
    },
    SystemAlert {
        source: String,
        payload: serde_json::Value,
    },
}

impl InboundMessage {
    /// 报文种类名（用于日志）。
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::SensorData { .. } => "sensor_data",
            InboundMessage::SensorStatus { .. } => "sensor_status",
            InboundMessage::GatewayHeartbeat { .. } => "gateway_heartbeat",
            InboundMessage::GatewayStatus { .. } => "gateway_status",
            InboundMessage::SystemAlert { .. } => "system_alert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TopicKind {
    SensorData,
    SensorStatus,
    GatewayHeartbeat,
    GatewayStatus,
    SystemAlert,
}

/// 按 topic 形状分类，返回报文种类与第 2 段标识。
fn classify(topic: &str) -> Option<(TopicKind, &str)> {
    let mut parts = topic.split('/');
    let root = parts.next()?;
    let id = parts.next()?;
    let suffix = parts.next()?;
    if parts.next().is_some() || id.is_empty() {
        return None;
    }
    let kind = match (root, suffix) {
        ("sensors", "data") => TopicKind::SensorData,
        ("sensors", "status") => TopicKind::SensorStatus,
        ("gateways", "heartbeat") => TopicKind::GatewayHeartbeat,
        ("gateways", "status") => TopicKind::GatewayStatus,
        ("system", "alert") => TopicKind::SystemAlert,
        _ => return None,
    };
    Some((kind, id))
}

/// 路由一帧。
pub fn route(frame: &RawEvent) -> Result<InboundMessage, RouteError> {
    let (kind, id) =
        classify(&frame.topic).ok_or_else(|| RouteError::UnknownTopic(frame.topic.clone()))?;
    let body: serde_json::Value = serde_json::from_slice(&frame.payload)
        .map_err(|err| RouteError::InvalidJson(err.to_string()))?;
    let device_id = id.to_string();
    let message = match kind {
        TopicKind::SensorData => InboundMessage::SensorData {
            device_id,
            payload: SensorDataPayload::parse(&body, frame.received_at_ms)?,
        },
        TopicKind::SensorStatus => InboundMessage::SensorStatus {
            device_id,
            payload: StatusPayload::parse(&body)?,
        },
        TopicKind::GatewayHeartbeat => InboundMessage::GatewayHeartbeat {
            device_id,
            payload: HeartbeatPayload::parse(&body)?,
        },
        TopicKind::GatewayStatus => InboundMessage::GatewayStatus {
            device_id,
            payload: StatusPayload::parse(&body)?,
        },
        TopicKind::SystemAlert => InboundMessage::SystemAlert {
            source: device_id,
            payload: body,
        },
    };
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::{TopicKind, classify};

    #[test]
    fn classify_exact_shapes() {
        assert_eq!(
            classify("sensors/TEMP_001/data"),
            Some((TopicKind::SensorData, "TEMP_001"))
        );
        assert_eq!(
            classify("gateways/GW_001/heartbeat"),
            Some((TopicKind::GatewayHeartbeat, "GW_001"))
        );
        assert_eq!(
            classify("system/core/alert"),
            Some((TopicKind::SystemAlert, "core"))
        );
    }

    #[test]
    fn classify_rejects_other_shapes() {
        assert_eq!(classify("sensors/TEMP_001"), None);
        assert_eq!(classify("sensors//data"), None);
        assert_eq!(classify("sensors/TEMP_001/data/extra"), None);
        assert_eq!(classify("gateways/GW_001/data"), None);
        assert_eq!(classify("devices/X/status"), None);
    }
}
