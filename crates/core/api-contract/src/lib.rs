//! 稳定的 DTO 与实时推送协议契约。
//!
//! - [`ApiResponse`]：HTTP 统计接口的标准响应封装
//! - [`ClientFrame`]：客户端 → 服务端控制帧（封闭枚举，穷尽匹配）
//! - [`ServerFrame`]：服务端 → 客户端推送帧

use domain::AlarmEvent;
use serde::{Deserialize, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 客户端控制帧。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
    JoinRoom {
        #[serde(default)]
        room: String,
    },
    LeaveRoom,
    GetStats,
    Subscribe {
        #[serde(default)]
        sensor_ids: Vec<i64>,
    },
    Unsubscribe {
        #[serde(default)]
        sensor_ids: Vec<i64>,
    },
}

const CLIENT_FRAME_TYPES: &[&str] = &[
    "ping",
    "join_room",
    "leave_room",
    "get_stats",
    "subscribe",
    "unsubscribe",
];

/// 控制帧解析错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("invalid message format")]
    InvalidJson,
    #[error("message type is required")]
    MissingType,
    #[error("unsupported message type: {0}")]
    UnsupportedType(String),
    #[error("invalid message fields: {0}")]
    InvalidFields(String),
}

impl ClientFrame {
    /// 解析一条文本帧。先校验 `type`，再按类型校验字段。
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|_| FrameError::InvalidJson)?;
        let kind = match value.get("type").and_then(|kind| kind.as_str()) {
            Some(kind) if !kind.is_empty() => kind.to_string(),
            _ => return Err(FrameError::MissingType),
        };
        if !CLIENT_FRAME_TYPES.contains(&kind.as_str()) {
            return Err(FrameError::UnsupportedType(kind));
        }
        serde_json::from_value(value).map_err(|err| FrameError::InvalidFields(err.to_string()))
    }
}

/// 连接统计（`get_stats` 与 `/ws/stats` 共用）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatsDto {
    pub total_connections: u64,
    pub active_connections: usize,
    pub active_rooms: usize,
    pub active_users: usize,
    pub messages_sent: u64,
    pub messages_failed: u64,
    pub rooms_created: u64,
}

/// 服务端推送帧。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    ConnectionEstablished {
        connection_id: u64,
        room: String,
        user_id: Option<String>,
        message: String,
        timestamp: String,
    },
    Ping {
        timestamp: String,
    },
    Pong {
        timestamp: String,
    },
    RoomJoined {
        room: String,
        timestamp: String,
    },
    RoomLeft {
        room: String,
        timestamp: String,
    },
    Stats {
        data: ConnectionStatsDto,
        timestamp: String,
    },
    SubscriptionConfirmed {
        sensor_ids: Vec<i64>,
    },
    UnsubscriptionConfirmed {
        sensor_ids: Vec<i64>,
    },
    SensorData {
        sensor_id: i64,
        device_id: String,
        value: f64,
        quality: String,
        timestamp: String,
        sensor_name: String,
        unit: Option<String>,
    },
    SensorStatus {
        sensor_id: i64,
        device_id: String,
        status: String,
        error: Option<String>,
        timestamp: String,
    },
    GatewayStatus {
        gateway_id: i64,
        device_id: String,
        status: String,
        timestamp: String,
    },
    GatewayHeartbeat {
        gateway_id: i64,
        device_id: String,
        uptime: Option<i64>,
        timestamp: String,
    },
    Alarm {
        data: AlarmEvent,
        timestamp: String,
    },
    Alert {
        source: String,
        data: serde_json::Value,
        timestamp: String,
    },
    Error {
        message: String,
        timestamp: String,
    },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
            timestamp: now_rfc3339(),
        }
    }

    /// 序列化为 JSON 文本帧。
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// 当前 UTC 时间（RFC 3339）。
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// 毫秒时间戳转 RFC 3339，越界时回退为当前时间。
pub fn rfc3339_from_ms(ts_ms: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ts_ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(now_rfc3339)
}
