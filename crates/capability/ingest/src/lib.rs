//! Broker 接入：连接、订阅与重连状态机。
//!
//! 状态：`Disconnected → Connecting → Connected → Reconnecting{attempt} → {Connected | Stopped}`。
//! 连接成功并完成订阅后重连计数归零；意外断线后按固定间隔重连，
//! 超过最大次数进入终态 `Stopped`，`run` 返回 `ReconnectExhausted` 交给调用方处理。

mod client;
mod mqtt;
mod stats;

pub use client::{IngressClient, ReconnectPolicy};
pub use mqtt::{MqttConnector, MqttConnectorConfig};
pub use stats::{IngressStats, IngressStatsSnapshot};

use async_trait::async_trait;
use domain::RawEvent;

/// 订阅的 topic 模式（通配段为设备标识）。
pub const SUBSCRIBED_TOPICS: [&str; 5] = [
    "sensors/+/data",
    "sensors/+/status",
    "gateways/+/heartbeat",
    "gateways/+/status",
    "system/+/alert",
];

/// 接入错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("broker connect failed: {0}")]
    Connect(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("broker connection lost: {0}")]
    Connection(String),
    #[error("handler error: {0}")]
    Handler(String),
    #[error("reconnect attempts exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

/// 接入状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// 终态：需要外部重启。
    Stopped,
}

impl IngressState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngressState::Disconnected => "disconnected",
            IngressState::Connecting => "connecting",
            IngressState::Connected => "connected",
            IngressState::Reconnecting { .. } => "reconnecting",
            IngressState::Stopped => "stopped",
        }
    }
}

/// 帧处理器：每帧在独立任务中调用，返回错误计入 failed。
#[async_trait]
pub trait FrameHandler: Send + Sync {
    async fn handle(&self, frame: RawEvent) -> Result<(), IngestError>;
}

/// Broker 连接器。
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BrokerSession>, IngestError>;
}

/// 一次已建立的 broker 会话。
#[async_trait]
pub trait BrokerSession: Send {
    async fn subscribe(&mut self, topics: &[&str]) -> Result<(), IngestError>;

    /// 下一帧；`Ok(None)` 表示 broker 正常关闭连接。
    async fn next_frame(&mut self) -> Result<Option<RawEvent>, IngestError>;
}
