//! Postgres 读数时序写入实现
//!
//! `sensor_readings` 只追加，标签列与读数字段同行存放。

use crate::error::StorageError;
use crate::models::ReadingPoint;
use crate::traits::ReadingStore;
use domain::{DeviceKind, Reading};
use sqlx::{PgPool, Row};

pub struct PgReadingStore {
    pub pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl ReadingStore for PgReadingStore {
    async fn append(&self, point: &ReadingPoint) -> Result<(), StorageError> {
        sqlx::query(
            "insert into sensor_readings \
             (time, sensor_id, device_id, device_kind, sensor_type, gateway_id, location, unit, value, quality) \
             values (to_timestamp($1 / 1000.0), $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(point.reading.ts_ms as f64)
        .bind(point.sensor_id)
        .bind(&point.reading.device_id)
        .bind(point.device_kind.as_str())
        .bind(&point.sensor_type)
        .bind(point.gateway_id)
        .bind(&point.location)
        .bind(&point.unit)
        .bind(point.reading.value)
        .bind(&point.reading.quality)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_recent(
        &self,
        device_id: &str,
        limit: usize,
    ) -> Result<Vec<ReadingPoint>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "select (extract(epoch from time) * 1000)::bigint as ts_ms, sensor_id, device_id, \
             device_kind, sensor_type, gateway_id, location, unit, value, quality \
             from sensor_readings where device_id = $1 order by time desc limit $2",
        )
        .bind(device_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            let device_kind: String = row.try_get("device_kind")?;
            points.push(ReadingPoint {
                sensor_id: row.try_get("sensor_id")?,
                device_kind: match device_kind.as_str() {
                    "gateway" => DeviceKind::Gateway,
                    _ => DeviceKind::Sensor,
                },
                sensor_type: row.try_get("sensor_type")?,
                gateway_id: row.try_get("gateway_id")?,
                location: row.try_get("location")?,
                unit: row.try_get("unit")?,
                reading: Reading {
                    device_id: row.try_get("device_id")?,
                    ts_ms: row.try_get("ts_ms")?,
                    value: row.try_get("value")?,
                    quality: row.try_get("quality")?,
                },
            });
        }
        Ok(points)
    }
}
