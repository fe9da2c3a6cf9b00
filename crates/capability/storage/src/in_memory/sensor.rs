//! 传感器内存存储实现

use crate::error::StorageError;
use crate::models::SensorRecord;
use crate::traits::SensorStore;
use domain::DeviceStatus;
use std::collections::HashMap;
use std::sync::RwLock;

/// 传感器内存存储
///
/// 以 device_id 为键，单把写锁内完成一行的全部字段更新。
pub struct InMemorySensorStore {
    sensors: RwLock<HashMap<String, SensorRecord>>,
}

impl Default for InMemorySensorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySensorStore {
    pub fn new() -> Self {
        Self {
            sensors: RwLock::new(HashMap::new()),
        }
    }

    /// 预置传感器记录（设备创建属于外部 CRUD）。
    pub fn with_sensors(sensors: impl IntoIterator<Item = SensorRecord>) -> Self {
        let map = sensors
            .into_iter()
            .map(|sensor| (sensor.device_id.clone(), sensor))
            .collect();
        Self {
            sensors: RwLock::new(map),
        }
    }

    pub fn insert(&self, sensor: SensorRecord) -> Result<(), StorageError> {
        let mut sensors = self
            .sensors
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        sensors.insert(sensor.device_id.clone(), sensor);
        Ok(())
    }
}

#[async_trait::async_trait]
impl SensorStore for InMemorySensorStore {
    async fn find_by_device_id(
        &self,
        device_id: &str,
    ) -> Result<Option<SensorRecord>, StorageError> {
        let sensors = self
            .sensors
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(sensors.get(device_id).cloned())
    }

    async fn record_reading(
        &self,
        device_id: &str,
        value: &str,
        at_ms: i64,
    ) -> Result<bool, StorageError> {
        let mut sensors = self
            .sensors
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(sensor) = sensors.get_mut(device_id) else {
            return Ok(false);
        };
        sensor.last_value = Some(value.to_string());
        sensor.last_data_time_ms = Some(at_ms);
        sensor.data_points_count += 1;
        sensor.status = DeviceStatus::Online;
        Ok(true)
    }

    async fn update_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
        error: Option<&str>,
        at_ms: i64,
    ) -> Result<Option<SensorRecord>, StorageError> {
        let mut sensors = self
            .sensors
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(sensor) = sensors.get_mut(device_id) else {
            return Ok(None);
        };
        sensor.status = status;
        if let Some(error) = error {
            sensor.error_count += 1;
            sensor.last_error = Some(error.to_string());
            sensor.last_error_time_ms = Some(at_ms);
        }
        Ok(Some(sensor.clone()))
    }
}
