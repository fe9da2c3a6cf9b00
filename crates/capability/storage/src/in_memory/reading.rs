//! 读数时序内存实现

use crate::error::StorageError;
use crate::models::ReadingPoint;
use crate::traits::ReadingStore;
use std::sync::RwLock;

/// 读数时序内存存储（只追加）。
pub struct InMemoryReadingStore {
    points: RwLock<Vec<ReadingPoint>>,
}

impl Default for InMemoryReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self {
            points: RwLock::new(Vec::new()),
        }
    }

    /// 已写入的点数（用于测试）
    pub fn len(&self) -> usize {
        self.points.read().map(|points| points.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn append(&self, point: &ReadingPoint) -> Result<(), StorageError> {
        let mut points = self
            .points
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        points.push(point.clone());
        Ok(())
    }

    async fn list_recent(
        &self,
        device_id: &str,
        limit: usize,
    ) -> Result<Vec<ReadingPoint>, StorageError> {
        let points = self
            .points
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<ReadingPoint> = points
            .iter()
            .filter(|point| point.reading.device_id == device_id)
            .cloned()
            .collect();
        // 时间相同的点保持后写在前
        items.reverse();
        items.sort_by(|a, b| b.reading.ts_ms.cmp(&a.reading.ts_ms));
        items.truncate(limit);
        Ok(items)
    }
}
