//! 内存存储实现模块
//!
//! 用于测试和无数据库的本地运行。
//!
//! 包含以下实现：
//! - SensorStore: InMemorySensorStore
//! - GatewayStore: InMemoryGatewayStore
//! - ReadingStore: InMemoryReadingStore
//! - ReadingCache: InMemoryReadingCache

pub mod cache;
pub mod gateway;
pub mod reading;
pub mod sensor;

pub use cache::*;
pub use gateway::*;
pub use reading::*;
pub use sensor::*;
