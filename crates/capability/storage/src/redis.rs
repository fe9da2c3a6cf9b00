//! Redis 读数缓存实现
//!
//! - `sensor:{id}:latest`：最新值，`SET EX`
//! - `sensor:{id}:series`：最新在前的列表，`LPUSH` + `LTRIM 0 cap-1` + `EXPIRE` 在一个原子 pipeline 内执行

use crate::error::StorageError;
use crate::models::CacheEntry;
use crate::traits::{CachePolicy, ReadingCache, latest_key, series_key};
use redis::AsyncCommands;

/// Redis 读数缓存
pub struct RedisReadingCache {
    client: redis::Client,
    policy: CachePolicy,
}

impl RedisReadingCache {
    pub fn new(client: redis::Client, policy: CachePolicy) -> Self {
        Self {
            client,
            policy: CachePolicy {
                series_cap: policy.series_cap.max(1),
                latest_ttl_seconds: policy.latest_ttl_seconds.max(1),
                series_ttl_seconds: policy.series_ttl_seconds.max(1),
            },
        }
    }

    pub fn connect(redis_url: &str, policy: CachePolicy) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::new(client, policy))
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StorageError> {
        Ok(self.client.get_multiplexed_tokio_connection().await?)
    }
}

#[async_trait::async_trait]
impl ReadingCache for RedisReadingCache {
    async fn refresh(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        let mut connection = self.connection().await?;
        let data = serde_json::to_string(entry)?;
        connection
            .set_ex::<_, _, ()>(latest_key(entry.sensor_id), &data, self.policy.latest_ttl_seconds)
            .await?;

        let key = series_key(entry.sensor_id);
        let stop = isize::try_from(self.policy.series_cap)
            .unwrap_or(isize::MAX)
            .saturating_sub(1);
        let ttl = i64::try_from(self.policy.series_ttl_seconds).unwrap_or(i64::MAX);
        redis::pipe()
            .atomic()
            .lpush(&key, &data)
            .ignore()
            .ltrim(&key, 0, stop)
            .ignore()
            .expire(&key, ttl)
            .ignore()
            .query_async::<_, ()>(&mut connection)
            .await?;
        Ok(())
    }

    async fn latest(&self, sensor_id: i64) -> Result<Option<CacheEntry>, StorageError> {
        let mut connection = self.connection().await?;
        let data: Option<String> = connection.get(latest_key(sensor_id)).await?;
        let Some(data) = data else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    async fn series(&self, sensor_id: i64) -> Result<Vec<CacheEntry>, StorageError> {
        let mut connection = self.connection().await?;
        let items: Vec<String> = connection.lrange(series_key(sensor_id), 0, -1).await?;
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            // 无法解析的历史条目跳过，不影响其余条目
            if let Ok(entry) = serde_json::from_str::<CacheEntry>(&item) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}
