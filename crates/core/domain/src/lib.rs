//! 共享领域模型：设备、读数、报警规则与报警事件。

pub mod alarm;
pub mod data;

pub use alarm::{AlarmEvent, AlarmRule, AlarmRuleSet, Comparison, Severity};
pub use data::{DeviceKind, DeviceStatus, RawEvent, Reading};

/// 默认房间名：未指定房间的连接都归入此房间。
pub const DEFAULT_ROOM: &str = "default";

/// 获取当前 Unix 时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
