//! 数据流水线：路由 → 持久化 → 报警评估 → 实时推送。
//!
//! 关系库更新、时序写入与缓存刷新之间没有事务关联，
//! 任一步失败只记录日志与 `persist_failures` 计数，后续步骤与后续消息照常处理。

mod handler;
mod writer;

pub use handler::{IngestPipeline, PipelineOutcome};
pub use writer::{PersistOutcome, PersistenceWriter};

use domain::DeviceKind;
use iot_normalize::RouteError;
use iot_storage::StorageError;
use iot_telemetry::FailureKind;

/// 流水线处理错误。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("unknown {} device: {device_id}", .kind.as_str())]
    UnknownDevice { kind: DeviceKind, device_id: String },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl PipelineError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PipelineError::Route(err) => err.failure_kind(),
            PipelineError::UnknownDevice { .. } => FailureKind::UnknownDevice,
            PipelineError::Storage(_) => FailureKind::Persistence,
        }
    }
}
