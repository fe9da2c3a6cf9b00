//! 接入统计。

use crate::IngressState;
use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug)]
struct Timeline {
    state: IngressState,
    last_message_at_ms: Option<i64>,
    connected_since_ms: Option<i64>,
}

/// 接入计数器（原子计数 + 互斥保护的时间点）。
#[derive(Debug)]
pub struct IngressStats {
    received: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    reconnect_attempts: AtomicU32,
    timeline: Mutex<Timeline>,
}

/// 统计快照。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngressStatsSnapshot {
    pub state: &'static str,
    pub received: u64,
    pub processed: u64,
    pub failed: u64,
    pub reconnect_attempts: u32,
    pub last_message_at_ms: Option<i64>,
    pub connected_since_ms: Option<i64>,
}

impl Default for IngressStats {
    fn default() -> Self {
        Self {
            received: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            reconnect_attempts: AtomicU32::new(0),
            timeline: Mutex::new(Timeline {
                state: IngressState::Disconnected,
                last_message_at_ms: None,
                connected_since_ms: None,
            }),
        }
    }
}

impl IngressStats {
    pub fn state(&self) -> IngressState {
        self.timeline
            .lock()
            .map(|timeline| timeline.state)
            .unwrap_or(IngressState::Stopped)
    }

    pub fn snapshot(&self) -> IngressStatsSnapshot {
        let (state, last_message_at_ms, connected_since_ms) = match self.timeline.lock() {
            Ok(timeline) => (
                timeline.state,
                timeline.last_message_at_ms,
                timeline.connected_since_ms,
            ),
            Err(_) => (IngressState::Stopped, None, None),
        };
        IngressStatsSnapshot {
            state: state.as_str(),
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            last_message_at_ms,
            connected_since_ms,
        }
    }

    pub(crate) fn set_state(&self, state: IngressState) {
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.state = state;
            match state {
                IngressState::Connected => {
                    timeline.connected_since_ms = Some(domain::now_epoch_ms());
                }
                IngressState::Connecting => {}
                _ => timeline.connected_since_ms = None,
            }
        }
        let attempts = match state {
            IngressState::Reconnecting { attempt } => attempt,
            IngressState::Connected => 0,
            _ => return,
        };
        self.reconnect_attempts.store(attempts, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self, at_ms: i64) {
        self.received.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.last_message_at_ms = Some(at_ms);
        }
    }

    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}
