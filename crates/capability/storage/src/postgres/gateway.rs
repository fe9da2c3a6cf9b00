//! Postgres 网关存储实现

use super::status_from_db;
use crate::error::StorageError;
use crate::models::GatewayRecord;
use crate::traits::GatewayStore;
use domain::DeviceStatus;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const GATEWAY_RETURNING: &str = "returning id::bigint as id, name, device_id, status, \
     (extract(epoch from last_seen) * 1000)::bigint as last_seen_ms, \
     coalesce(uptime, 0)::bigint as uptime";

pub struct PgGatewayStore {
    pub pool: PgPool,
}

impl PgGatewayStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 通过数据库 URL 建立连接池
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

fn gateway_from_row(row: &PgRow) -> Result<GatewayRecord, StorageError> {
    let status: Option<String> = row.try_get("status")?;
    Ok(GatewayRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        device_id: row.try_get("device_id")?,
        status: status
            .as_deref()
            .map(status_from_db)
            .unwrap_or(DeviceStatus::Offline),
        last_seen_ms: row.try_get("last_seen_ms")?,
        uptime_seconds: row.try_get("uptime")?,
    })
}

#[async_trait::async_trait]
impl GatewayStore for PgGatewayStore {
    async fn find_by_device_id(
        &self,
        device_id: &str,
    ) -> Result<Option<GatewayRecord>, StorageError> {
        let row = sqlx::query(
            "select id::bigint as id, name, device_id, status, \
             (extract(epoch from last_seen) * 1000)::bigint as last_seen_ms, \
             coalesce(uptime, 0)::bigint as uptime \
             from gateways where device_id = $1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| gateway_from_row(&row)).transpose()
    }

    async fn update_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
    ) -> Result<Option<GatewayRecord>, StorageError> {
        let sql = format!(
            "update gateways set status = $2, updated_at = now() \
             where device_id = $1 {GATEWAY_RETURNING}"
        );
        let row = sqlx::query(&sql)
            .bind(device_id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| gateway_from_row(&row)).transpose()
    }

    async fn record_heartbeat(
        &self,
        device_id: &str,
        uptime: Option<i64>,
        at_ms: i64,
    ) -> Result<Option<GatewayRecord>, StorageError> {
        let sql = format!(
            "update gateways set status = 'online', last_seen = to_timestamp($2 / 1000.0), \
             uptime = coalesce($3, uptime), updated_at = now() \
             where device_id = $1 {GATEWAY_RETURNING}"
        );
        let row = sqlx::query(&sql)
            .bind(device_id)
            .bind(at_ms as f64)
            .bind(uptime)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| gateway_from_row(&row)).transpose()
    }
}
