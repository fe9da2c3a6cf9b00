//! 网关内存存储实现

use crate::error::StorageError;
use crate::models::GatewayRecord;
use crate::traits::GatewayStore;
use domain::DeviceStatus;
use std::collections::HashMap;
use std::sync::RwLock;

/// 网关内存存储
pub struct InMemoryGatewayStore {
    gateways: RwLock<HashMap<String, GatewayRecord>>,
}

impl Default for InMemoryGatewayStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGatewayStore {
    pub fn new() -> Self {
        Self {
            gateways: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_gateways(gateways: impl IntoIterator<Item = GatewayRecord>) -> Self {
        let map = gateways
            .into_iter()
            .map(|gateway| (gateway.device_id.clone(), gateway))
            .collect();
        Self {
            gateways: RwLock::new(map),
        }
    }
}

#[async_trait::async_trait]
impl GatewayStore for InMemoryGatewayStore {
    async fn find_by_device_id(
        &self,
        device_id: &str,
    ) -> Result<Option<GatewayRecord>, StorageError> {
        let gateways = self
            .gateways
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(gateways.get(device_id).cloned())
    }

    async fn update_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
    ) -> Result<Option<GatewayRecord>, StorageError> {
        let mut gateways = self
            .gateways
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(gateways.get_mut(device_id).map(|gateway| {
            gateway.status = status;
            gateway.clone()
        }))
    }

    async fn record_heartbeat(
        &self,
        device_id: &str,
        uptime: Option<i64>,
        at_ms: i64,
    ) -> Result<Option<GatewayRecord>, StorageError> {
        let mut gateways = self
            .gateways
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(gateways.get_mut(device_id).map(|gateway| {
            gateway.status = DeviceStatus::Online;
            gateway.last_seen_ms = Some(at_ms);
            if let Some(uptime) = uptime {
                gateway.uptime_seconds = uptime;
            }
            gateway.clone()
        }))
    }
}
