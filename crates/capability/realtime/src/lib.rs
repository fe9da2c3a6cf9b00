//! 实时推送：连接注册表、扇出投递、存活探测与 WebSocket 会话。
//!
//! 注册表用一把 `RwLock` 同时保护主表与房间、用户两个二级索引，
//! 每次变更在同一把写锁内完成，外部观察不到部分完成的状态。
//! 扇出先在读锁内取快照，再在锁外并发发送；单个连接发送失败只移除该连接。

mod dispatch;
mod registry;
mod session;
mod sink;

pub use dispatch::{DeliveryReport, FanoutDispatcher, spawn_liveness_probe};
pub use registry::{
    ConnectionId, ConnectionInfo, ConnectionRegistry, Recipient, RoomInfo, UserInfo,
};
pub use session::{SessionContext, handle_client_text, run_session};
pub use sink::{ChannelSink, ConnectionSink, Outbound, OutboundReceiver};

/// 实时推送错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealtimeError {
    #[error("room name cannot be empty")]
    EmptyRoom,
    #[error("connection not found: {0}")]
    UnknownConnection(ConnectionId),
    #[error("send buffer full")]
    BufferFull,
    #[error("connection closed")]
    Closed,
    #[error("registry lock poisoned")]
    Poisoned,
}
