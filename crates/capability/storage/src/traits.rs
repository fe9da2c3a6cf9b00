//! 存储接口定义
//!
//! - SensorStore：传感器状态（关系库）
//! - GatewayStore：网关状态（关系库）
//! - ReadingStore：读数时序写入与查询
//! - ReadingCache：最新值与最近 N 条序列缓存
//!
//! 每个设备行独立更新，不需要跨设备锁，只要求单行更新原子。

use crate::error::StorageError;
use crate::models::{CacheEntry, GatewayRecord, ReadingPoint, SensorRecord};
use domain::DeviceStatus;

#[async_trait::async_trait]
pub trait SensorStore: Send + Sync {
    async fn find_by_device_id(&self, device_id: &str)
    -> Result<Option<SensorRecord>, StorageError>;

    /// 单次原子更新：写 last_value / last_data_time，data_points_count + 1，状态置为 online。
    /// 设备不存在时返回 false。
    async fn record_reading(
        &self,
        device_id: &str,
        value: &str,
        at_ms: i64,
    ) -> Result<bool, StorageError>;

    /// 更新状态；带错误信息时 error_count + 1 并记录 last_error / last_error_time。
    async fn update_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
        error: Option<&str>,
        at_ms: i64,
    ) -> Result<Option<SensorRecord>, StorageError>;
}

#[async_trait::async_trait]
pub trait GatewayStore: Send + Sync {
    async fn find_by_device_id(
        &self,
        device_id: &str,
    ) -> Result<Option<GatewayRecord>, StorageError>;

    async fn update_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
    ) -> Result<Option<GatewayRecord>, StorageError>;

    /// 心跳：状态置为 online、刷新 last_seen，带 uptime 时一并记录。
    async fn record_heartbeat(
        &self,
        device_id: &str,
        uptime: Option<i64>,
        at_ms: i64,
    ) -> Result<Option<GatewayRecord>, StorageError>;
}

#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    async fn append(&self, point: &ReadingPoint) -> Result<(), StorageError>;

    /// 按时间倒序返回最近的读数。
    async fn list_recent(
        &self,
        device_id: &str,
        limit: usize,
    ) -> Result<Vec<ReadingPoint>, StorageError>;
}

#[async_trait::async_trait]
pub trait ReadingCache: Send + Sync {
    /// 刷新最新值并把条目压入序列头部（序列长度不超过上限）。
    async fn refresh(&self, entry: &CacheEntry) -> Result<(), StorageError>;

    async fn latest(&self, sensor_id: i64) -> Result<Option<CacheEntry>, StorageError>;

    /// 最近的条目，最新在前。
    async fn series(&self, sensor_id: i64) -> Result<Vec<CacheEntry>, StorageError>;
}

/// 缓存 TTL 与序列上限。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub latest_ttl_seconds: u64,
    pub series_ttl_seconds: u64,
    pub series_cap: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            latest_ttl_seconds: 3600,
            series_ttl_seconds: 86_400,
            series_cap: 100,
        }
    }
}

pub fn latest_key(sensor_id: i64) -> String {
    format!("sensor:{}:latest", sensor_id)
}

pub fn series_key(sensor_id: i64) -> String {
    format!("sensor:{}:series", sensor_id)
}
