//! 单个 WebSocket 连接的会话。
//!
//! 每个连接两个循环：
//! - 写循环：消费 [`ChannelSink`] 的出站队列写入 socket，收到关闭信号后发送 Close 帧；
//! - 读循环：按到达顺序处理客户端控制帧，结束时注销连接。
//!
//! 服务端注销连接（投递失败、存活探测失败或停机）时两个循环都会退出，
//! 即使对端不再发送任何数据，socket 也会在 Close 帧发出后释放。

use crate::dispatch::FanoutDispatcher;
use crate::registry::ConnectionId;
use crate::sink::{ChannelSink, Outbound, OutboundReceiver};
use api_contract::{ClientFrame, ServerFrame, now_rfc3339};
use axum::extract::ws::{Message, WebSocket};
use domain::DEFAULT_ROOM;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// 所有会话共享的上下文。
#[derive(Clone)]
pub struct SessionContext {
    pub dispatcher: FanoutDispatcher,
    /// 每个连接的出站缓冲帧数。
    pub send_buffer: usize,
}

/// 驱动一个 WebSocket 连接直到断开。
pub async fn run_session(
    socket: WebSocket,
    ctx: SessionContext,
    user_id: Option<String>,
    room: Option<String>,
) {
    let registry = ctx.dispatcher.registry().clone();
    let (sink, outbound) = ChannelSink::new(ctx.send_buffer);
    let info = match registry.register(sink, user_id, room) {
        Ok(info) => info,
        Err(err) => {
            debug!(target: "iot.realtime", error = %err, "connection_rejected");
            return;
        }
    };
    let id = info.id;

    let (ws_sender, ws_receiver) = socket.split();
    let closed = outbound.closed.clone();
    let mut writer = tokio::spawn(send_loop(ws_sender, outbound, id));

    let hello = ServerFrame::ConnectionEstablished {
        connection_id: id.0,
        room: info.room,
        user_id: info.user_id,
        message: "websocket connection established".to_string(),
        timestamp: now_rfc3339(),
    };
    ctx.dispatcher.send_to_connection(id, &hello).await;

    recv_loop(ws_receiver, closed, id, &ctx).await;

    registry.unregister(id);
    // 写任务发出 Close 后退出；对端不读时最多等待 WRITER_DRAIN_TIMEOUT。
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }
    debug!(target: "iot.realtime", connection_id = id.0, "session_ended");
}

async fn send_loop(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut outbound: OutboundReceiver,
    id: ConnectionId,
) {
    loop {
        if *outbound.closed.borrow() {
            let _ = ws_sender.send(Message::Close(None)).await;
            break;
        }
        tokio::select! {
            frame = outbound.frames.recv() => match frame {
                Some(Outbound::Text(text)) => {
                    if let Err(err) = ws_sender.send(Message::Text(text.to_string())).await {
                        debug!(target: "iot.realtime", connection_id = id.0, error = %err, "socket_write_failed");
                        break;
                    }
                }
                None => break,
            },
            changed = outbound.closed.changed() => {
                if changed.is_err() {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }
}

async fn recv_loop(
    mut ws_receiver: SplitStream<WebSocket>,
    mut closed: watch::Receiver<bool>,
    id: ConnectionId,
    ctx: &SessionContext,
) {
    loop {
        if *closed.borrow_and_update() {
            debug!(target: "iot.realtime", connection_id = id.0, "connection_closed_by_server");
            break;
        }
        let next = tokio::select! {
            next = ws_receiver.next() => next,
            changed = closed.changed() => {
                if changed.is_err() {
                    // 发送端已随注销释放。
                    break;
                }
                continue;
            }
        };
        let Some(result) = next else {
            break;
        };
        let message = match result {
            Ok(message) => message,
            Err(err) => {
                debug!(target: "iot.realtime", connection_id = id.0, error = %err, "socket_read_failed");
                break;
            }
        };
        match message {
            Message::Text(text) => handle_client_text(ctx, id, &text).await,
            Message::Binary(bytes) => {
                handle_client_text(ctx, id, &String::from_utf8_lossy(&bytes)).await
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

/// 处理一条客户端文本帧并把应答发回该连接。
pub async fn handle_client_text(ctx: &SessionContext, id: ConnectionId, text: &str) {
    let registry = ctx.dispatcher.registry();
    registry.touch(id);
    let reply = match ClientFrame::parse(text) {
        Ok(frame) => respond(ctx, id, frame),
        Err(err) => {
            warn!(target: "iot.realtime", connection_id = id.0, error = %err, "invalid_client_frame");
            ServerFrame::error(err.to_string())
        }
    };
    ctx.dispatcher.send_to_connection(id, &reply).await;
}

fn respond(ctx: &SessionContext, id: ConnectionId, frame: ClientFrame) -> ServerFrame {
    let registry = ctx.dispatcher.registry();
    match frame {
        ClientFrame::Ping => ServerFrame::Pong {
            timestamp: now_rfc3339(),
        },
        ClientFrame::JoinRoom { room } => match registry.change_room(id, &room) {
            Ok(_) => ServerFrame::RoomJoined {
                room: room.trim().to_string(),
                timestamp: now_rfc3339(),
            },
            Err(err) => ServerFrame::error(err.to_string()),
        },
        ClientFrame::LeaveRoom => match registry.change_room(id, DEFAULT_ROOM) {
            Ok(previous) => ServerFrame::RoomLeft {
                room: previous,
                timestamp: now_rfc3339(),
            },
            Err(err) => ServerFrame::error(err.to_string()),
        },
        ClientFrame::GetStats => ServerFrame::Stats {
            data: registry.stats(),
            timestamp: now_rfc3339(),
        },
        ClientFrame::Subscribe { sensor_ids } => match registry.subscribe(id, &sensor_ids) {
            Ok(()) => ServerFrame::SubscriptionConfirmed { sensor_ids },
            Err(err) => ServerFrame::error(err.to_string()),
        },
        ClientFrame::Unsubscribe { sensor_ids } => match registry.unsubscribe(id, &sensor_ids) {
            Ok(()) => ServerFrame::UnsubscriptionConfirmed { sensor_ids },
            Err(err) => ServerFrame::error(err.to_string()),
        },
    }
}
