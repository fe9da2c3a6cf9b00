//! PostgreSQL 存储实现模块
//!
//! 包含以下实现：
//! - SensorStore: PgSensorStore（`sensors` + `sensor_types`）
//! - GatewayStore: PgGatewayStore（`gateways`）
//! - ReadingStore: PgReadingStore（`sensor_readings` 时序表，兼容 TimescaleDB hypertable）
//!
//! 时间列统一为 timestamptz，进出边界时换算为 Unix 毫秒。

pub mod gateway;
pub mod reading;
pub mod sensor;

pub use gateway::*;
pub use reading::*;
pub use sensor::*;

use domain::DeviceStatus;

/// 库里的未知状态字符串按离线处理。
pub(crate) fn status_from_db(value: &str) -> DeviceStatus {
    DeviceStatus::parse(value).unwrap_or(DeviceStatus::Offline)
}
