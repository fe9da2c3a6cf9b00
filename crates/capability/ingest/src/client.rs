//! 接入客户端：驱动连接状态机，把每帧交给独立任务处理。

use crate::stats::{IngressStats, IngressStatsSnapshot};
use crate::{
    BrokerConnector, BrokerSession, FrameHandler, IngestError, IngressState, SUBSCRIBED_TOPICS,
};
use domain::RawEvent;
use iot_telemetry::FailureKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// 重连策略：固定间隔，超过最大次数后停止。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 10,
        }
    }
}

enum SessionEnd {
    Shutdown,
    Lost(IngestError),
}

/// 接入客户端。
pub struct IngressClient {
    connector: Arc<dyn BrokerConnector>,
    policy: ReconnectPolicy,
    stats: Arc<IngressStats>,
}

impl IngressClient {
    pub fn new(connector: Arc<dyn BrokerConnector>, policy: ReconnectPolicy) -> Self {
        Self {
            connector,
            policy,
            stats: Arc::new(IngressStats::default()),
        }
    }

    pub fn state(&self) -> IngressState {
        self.stats.state()
    }

    pub fn stats(&self) -> IngressStatsSnapshot {
        self.stats.snapshot()
    }

    /// 运行直到收到关闭信号（返回 Ok）或重连次数耗尽（返回 `ReconnectExhausted`）。
    pub async fn run(
        &self,
        handler: Arc<dyn FrameHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), IngestError> {
        let mut attempt: u32 = 0;
        loop {
            self.transition(IngressState::Connecting);
            let mut session_shutdown = shutdown.clone();
            let end = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => SessionEnd::Shutdown,
                end = self.run_session(&handler, &mut attempt, &mut session_shutdown) => end,
            };
            let err = match end {
                SessionEnd::Shutdown => {
                    self.stop();
                    return Ok(());
                }
                SessionEnd::Lost(err) => err,
            };
            iot_telemetry::record_failure(FailureKind::TransientIo);

            attempt += 1;
            if attempt > self.policy.max_attempts {
                self.transition(IngressState::Stopped);
                error!(
                    target: "iot.ingest",
                    attempts = self.policy.max_attempts,
                    error = %err,
                    "ingress_reconnect_exhausted"
                );
                return Err(IngestError::ReconnectExhausted {
                    attempts: self.policy.max_attempts,
                });
            }
            warn!(
                target: "iot.ingest",
                attempt,
                max_attempts = self.policy.max_attempts,
                interval_ms = self.policy.interval.as_millis() as u64,
                error = %err,
                "ingress_disconnected"
            );
            self.transition(IngressState::Reconnecting { attempt });
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => {
                    self.stop();
                    return Ok(());
                }
                _ = tokio::time::sleep(self.policy.interval) => {}
            }
        }
    }

    async fn run_session(
        &self,
        handler: &Arc<dyn FrameHandler>,
        attempt: &mut u32,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let mut session = match self.connector.connect().await {
            Ok(session) => session,
            Err(err) => return SessionEnd::Lost(err),
        };
        if let Err(err) = session.subscribe(&SUBSCRIBED_TOPICS).await {
            return SessionEnd::Lost(err);
        }
        *attempt = 0;
        self.transition(IngressState::Connected);
        info!(target: "iot.ingest", topics = SUBSCRIBED_TOPICS.len(), "ingress_subscribed");
        self.pump(session.as_mut(), handler, shutdown).await
    }

    async fn pump(
        &self,
        session: &mut dyn BrokerSession,
        handler: &Arc<dyn FrameHandler>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            let next = tokio::select! {
                _ = shutdown_requested(shutdown) => return SessionEnd::Shutdown,
                next = session.next_frame() => next,
            };
            match next {
                Ok(Some(frame)) => self.dispatch(frame, handler),
                Ok(None) => {
                    return SessionEnd::Lost(IngestError::Connection(
                        "closed by broker".to_string(),
                    ));
                }
                Err(err) => return SessionEnd::Lost(err),
            }
        }
    }

    /// 读循环只负责接收，处理在独立任务中完成。
    fn dispatch(&self, frame: RawEvent, handler: &Arc<dyn FrameHandler>) {
        self.stats.record_received(frame.received_at_ms);
        iot_telemetry::record_frame_received();
        let handler = Arc::clone(handler);
        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            let topic = frame.topic.clone();
            match handler.handle(frame).await {
                Ok(()) => stats.record_processed(),
                Err(err) => {
                    stats.record_failed();
                    debug!(target: "iot.ingest", topic = %topic, error = %err, "frame_failed");
                }
            }
        });
    }

    fn transition(&self, state: IngressState) {
        let previous = self.stats.state();
        if previous != state {
            info!(
                target: "iot.ingest",
                from = previous.as_str(),
                to = state.as_str(),
                "ingress_state"
            );
        }
        self.stats.set_state(state);
    }

    fn stop(&self) {
        self.transition(IngressState::Stopped);
        info!(target: "iot.ingest", "ingress_stopped");
    }
}

/// 收到关闭信号（或发送端已释放）时返回。
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
