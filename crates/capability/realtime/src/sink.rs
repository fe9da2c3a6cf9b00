//! 连接发送端。

use crate::RealtimeError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// 单个连接的发送端。
#[async_trait]
pub trait ConnectionSink: Send + Sync {
    /// 投递一帧已序列化的文本；失败即视为该连接投递失败。
    async fn send(&self, text: Arc<str>) -> Result<(), RealtimeError>;

    /// 关闭连接（幂等）。
    fn close(&self);
}

/// 写任务收到的出站消息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(Arc<str>),
}

/// 有界 mpsc 实现的发送端，由每个连接独立的写任务消费。
///
/// 缓冲写满或写任务已退出都算投递失败，慢连接不会拖住其他连接。
pub struct ChannelSink {
    tx: mpsc::Sender<Outbound>,
    closed: watch::Sender<bool>,
}

/// 写任务一侧：出站队列与关闭信号。
pub struct OutboundReceiver {
    pub frames: mpsc::Receiver<Outbound>,
    pub closed: watch::Receiver<bool>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Arc<Self>, OutboundReceiver) {
        let (tx, frames) = mpsc::channel(capacity.max(1));
        let (closed, closed_rx) = watch::channel(false);
        (
            Arc::new(Self { tx, closed }),
            OutboundReceiver {
                frames,
                closed: closed_rx,
            },
        )
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.tx.is_closed()
    }
}

#[async_trait]
impl ConnectionSink for ChannelSink {
    async fn send(&self, text: Arc<str>) -> Result<(), RealtimeError> {
        if *self.closed.borrow() {
            return Err(RealtimeError::Closed);
        }
        self.tx.try_send(Outbound::Text(text)).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => RealtimeError::BufferFull,
            mpsc::error::TrySendError::Closed(_) => RealtimeError::Closed,
        })
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::{ChannelSink, ConnectionSink, Outbound};
    use crate::RealtimeError;
    use std::sync::Arc;

    #[tokio::test]
    async fn full_buffer_is_a_delivery_failure() {
        let (sink, mut rx) = ChannelSink::new(1);
        sink.send(Arc::from("a")).await.expect("first");
        assert_eq!(sink.send(Arc::from("b")).await, Err(RealtimeError::BufferFull));
        assert_eq!(rx.frames.recv().await, Some(Outbound::Text(Arc::from("a"))));
    }

    #[tokio::test]
    async fn closed_sink_rejects_and_signals() {
        let (sink, rx) = ChannelSink::new(4);
        sink.close();
        assert!(*rx.closed.borrow());
        assert!(sink.is_closed());
        assert_eq!(sink.send(Arc::from("a")).await, Err(RealtimeError::Closed));
    }

    #[tokio::test]
    async fn dropped_writer_is_a_delivery_failure() {
        let (sink, rx) = ChannelSink::new(4);
        drop(rx);
        assert_eq!(sink.send(Arc::from("a")).await, Err(RealtimeError::Closed));
    }
}
