//! 追踪初始化、请求 ID 生成与进程级计数器。

use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 失败分类：决定计数归属与日志级别，不改变处理流程。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// broker 或客户端 socket 故障，按固定间隔重试，超限后终止。
    TransientIo,
    /// 无法解析的报文或缺少必填字段，丢弃不重试。
    MalformedMessage,
    /// 设备标识不存在，丢弃并记录。
    UnknownDevice,
    /// 任一存储写入失败，记录后继续处理后续消息。
    Persistence,
    /// 单个连接发送失败，仅移除该连接。
    Delivery,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::TransientIo => "transient_io",
            FailureKind::MalformedMessage => "malformed_message",
            FailureKind::UnknownDevice => "unknown_device",
            FailureKind::Persistence => "persistence",
            FailureKind::Delivery => "delivery",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_processed: u64,
    pub frames_failed: u64,
    pub dropped_malformed: u64,
    pub dropped_unknown_device: u64,
    pub persist_failures: u64,
    pub transient_io_failures: u64,
    pub alarms_raised: u64,
    pub fanout_delivered: u64,
    pub fanout_failed: u64,
    pub connections_opened: u64,
    pub connections_closed: u64,
}

/// 进程级计数器。
pub struct TelemetryMetrics {
    frames_received: AtomicU64,
    frames_processed: AtomicU64,
    frames_failed: AtomicU64,
    dropped_malformed: AtomicU64,
    dropped_unknown_device: AtomicU64,
    persist_failures: AtomicU64,
    transient_io_failures: AtomicU64,
    alarms_raised: AtomicU64,
    fanout_delivered: AtomicU64,
    fanout_failed: AtomicU64,
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            frames_processed: AtomicU64::new(0),
            frames_failed: AtomicU64::new(0),
            dropped_malformed: AtomicU64::new(0),
            dropped_unknown_device: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            transient_io_failures: AtomicU64::new(0),
            alarms_raised: AtomicU64::new(0),
            fanout_delivered: AtomicU64::new(0),
            fanout_failed: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_failed: self.frames_failed.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_unknown_device: self.dropped_unknown_device.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            transient_io_failures: self.transient_io_failures.load(Ordering::Relaxed),
            alarms_raised: self.alarms_raised.load(Ordering::Relaxed),
            fanout_delivered: self.fanout_delivered.load(Ordering::Relaxed),
            fanout_failed: self.fanout_failed.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
        }
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录从 broker 收到的帧数。
pub fn record_frame_received() {
    metrics().frames_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录处理完成的帧数。
pub fn record_frame_processed() {
    metrics().frames_processed.fetch_add(1, Ordering::Relaxed);
}

/// 记录一帧被丢弃：无论原因都计入 frames_failed，再按分类计数。
pub fn record_frame_dropped(kind: FailureKind) {
    metrics().frames_failed.fetch_add(1, Ordering::Relaxed);
    record_failure(kind);
}

/// 记录按失败分类的丢弃或故障。
pub fn record_failure(kind: FailureKind) {
    let metrics = metrics();
    match kind {
        FailureKind::MalformedMessage => {
            metrics.dropped_malformed.fetch_add(1, Ordering::Relaxed);
        }
        FailureKind::UnknownDevice => {
            metrics
                .dropped_unknown_device
                .fetch_add(1, Ordering::Relaxed);
        }
        FailureKind::Persistence => {
            metrics.persist_failures.fetch_add(1, Ordering::Relaxed);
        }
        FailureKind::TransientIo => {
            metrics
                .transient_io_failures
                .fetch_add(1, Ordering::Relaxed);
        }
        FailureKind::Delivery => {
            metrics.fanout_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// 记录触发的报警事件数。
pub fn record_alarms(count: u64) {
    metrics().alarms_raised.fetch_add(count, Ordering::Relaxed);
}

/// 记录一次扇出的成功投递数。
pub fn record_fanout_delivered(count: u64) {
    metrics()
        .fanout_delivered
        .fetch_add(count, Ordering::Relaxed);
}

/// 记录新建的实时连接。
pub fn record_connection_opened() {
    metrics()
        .connections_opened
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录关闭的实时连接。
pub fn record_connection_closed() {
    metrics()
        .connections_closed
        .fetch_add(1, Ordering::Relaxed);
}
