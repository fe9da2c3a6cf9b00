//! Postgres 传感器存储实现

use super::status_from_db;
use crate::error::StorageError;
use crate::models::SensorRecord;
use crate::traits::SensorStore;
use domain::DeviceStatus;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const SENSOR_COLUMNS: &str = "s.id::bigint as id, s.name, s.device_id, s.gateway_id::bigint as gateway_id, \
     s.location, t.name as sensor_type, t.unit, s.alarm_enabled, \
     s.alarm_rules::text as alarm_rules, s.status, s.last_value, \
     (extract(epoch from s.last_data_time) * 1000)::bigint as last_data_time_ms, \
     s.data_points_count::bigint as data_points_count, s.error_count::bigint as error_count, \
     s.last_error, (extract(epoch from s.last_error_time) * 1000)::bigint as last_error_time_ms";

pub struct PgSensorStore {
    pub pool: PgPool,
}

impl PgSensorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 通过数据库 URL 建立连接池
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }

    async fn fetch(&self, device_id: &str) -> Result<Option<SensorRecord>, StorageError> {
        let sql = format!(
            "select {SENSOR_COLUMNS} from sensors s \
             left join sensor_types t on t.id = s.sensor_type_id \
             where s.device_id = $1"
        );
        let row = sqlx::query(&sql)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| sensor_from_row(&row)).transpose()
    }
}

fn sensor_from_row(row: &PgRow) -> Result<SensorRecord, StorageError> {
    let alarm_rules: Option<String> = row.try_get("alarm_rules")?;
    let alarm_rules = alarm_rules
        .map(|text| serde_json::from_str(&text))
        .transpose()?;
    let status: Option<String> = row.try_get("status")?;
    Ok(SensorRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        device_id: row.try_get("device_id")?,
        gateway_id: row.try_get("gateway_id")?,
        location: row.try_get("location")?,
        sensor_type: row.try_get("sensor_type")?,
        unit: row.try_get("unit")?,
        alarm_enabled: row
            .try_get::<Option<bool>, _>("alarm_enabled")?
            .unwrap_or(true),
        alarm_rules,
        status: status
            .as_deref()
            .map(status_from_db)
            .unwrap_or(DeviceStatus::Offline),
        last_value: row.try_get("last_value")?,
        last_data_time_ms: row.try_get("last_data_time_ms")?,
        data_points_count: row
            .try_get::<Option<i64>, _>("data_points_count")?
            .unwrap_or(0),
        error_count: row.try_get::<Option<i64>, _>("error_count")?.unwrap_or(0),
        last_error: row.try_get("last_error")?,
        last_error_time_ms: row.try_get("last_error_time_ms")?,
    })
}

#[async_trait::async_trait]
impl SensorStore for PgSensorStore {
    async fn find_by_device_id(
        &self,
        device_id: &str,
    ) -> Result<Option<SensorRecord>, StorageError> {
        self.fetch(device_id).await
    }

    async fn record_reading(
        &self,
        device_id: &str,
        value: &str,
        at_ms: i64,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "update sensors set last_value = $2, last_data_time = to_timestamp($3 / 1000.0), \
             data_points_count = coalesce(data_points_count, 0) + 1, status = 'online', \
             updated_at = now() \
             where device_id = $1",
        )
        .bind(device_id)
        .bind(value)
        .bind(at_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
        error: Option<&str>,
        at_ms: i64,
    ) -> Result<Option<SensorRecord>, StorageError> {
        let result = match error {
            Some(error) => {
                sqlx::query(
                    "update sensors set status = $2, \
                     error_count = coalesce(error_count, 0) + 1, last_error = $3, \
                     last_error_time = to_timestamp($4 / 1000.0), updated_at = now() \
                     where device_id = $1",
                )
                .bind(device_id)
                .bind(status.as_str())
                .bind(error)
                .bind(at_ms as f64)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "update sensors set status = $2, updated_at = now() where device_id = $1",
                )
                .bind(device_id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await?
            }
        };
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch(device_id).await
    }
}
