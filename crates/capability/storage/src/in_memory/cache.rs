//! 读数缓存内存实现
//!
//! 与 Redis 实现保持相同的键语义：最新值与序列各自独立过期，序列长度不超过上限。

use crate::error::StorageError;
use crate::models::CacheEntry;
use crate::traits::{CachePolicy, ReadingCache};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn live(&self, now: Instant) -> Option<&T> {
        (now < self.expires_at).then_some(&self.value)
    }
}

#[derive(Default)]
struct CacheState {
    latest: HashMap<i64, Expiring<CacheEntry>>,
    series: HashMap<i64, Expiring<VecDeque<CacheEntry>>>,
}

/// 读数缓存内存存储
pub struct InMemoryReadingCache {
    policy: CachePolicy,
    state: RwLock<CacheState>,
}

impl Default for InMemoryReadingCache {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

impl InMemoryReadingCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy: CachePolicy {
                series_cap: policy.series_cap.max(1),
                ..policy
            },
            state: RwLock::new(CacheState::default()),
        }
    }
}

#[async_trait::async_trait]
impl ReadingCache for InMemoryReadingCache {
    async fn refresh(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        let now = Instant::now();
        let mut state = self
            .state
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        state.latest.insert(
            entry.sensor_id,
            Expiring {
                value: entry.clone(),
                expires_at: now + Duration::from_secs(self.policy.latest_ttl_seconds),
            },
        );
        let series_expires_at = now + Duration::from_secs(self.policy.series_ttl_seconds);
        let series = state
            .series
            .entry(entry.sensor_id)
            .or_insert_with(|| Expiring {
                value: VecDeque::new(),
                expires_at: series_expires_at,
            });
        // 过期的列表等同于不存在
        if now >= series.expires_at {
            series.value.clear();
        }
        series.value.push_front(entry.clone());
        series.value.truncate(self.policy.series_cap);
        series.expires_at = series_expires_at;
        Ok(())
    }

    async fn latest(&self, sensor_id: i64) -> Result<Option<CacheEntry>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(state
            .latest
            .get(&sensor_id)
            .and_then(|item| item.live(Instant::now()))
            .cloned())
    }

    async fn series(&self, sensor_id: i64) -> Result<Vec<CacheEntry>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(state
            .series
            .get(&sensor_id)
            .and_then(|item| item.live(Instant::now()))
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default())
    }
}
