use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::Response,
    routing::get,
};
use iot_realtime::{ConnectionRegistry, FanoutDispatcher, SessionContext, run_session};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

#[derive(Clone)]
struct ServerState {
    ctx: SessionContext,
    ended: mpsc::UnboundedSender<()>,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        run_session(socket, state.ctx, None, None).await;
        let _ = state.ended.send(());
    })
}

async fn serve(registry: Arc<ConnectionRegistry>) -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let (ended, ended_rx) = mpsc::unbounded_channel();
    let state = ServerState {
        ctx: SessionContext {
            dispatcher: FanoutDispatcher::new(registry),
            send_buffer: 8,
        },
        ended,
    };
    let app = Router::new().route("/ws", get(ws_handler)).with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, ended_rx)
}

/// 完成握手后不再发送任何数据的客户端。
async fn silent_client(addr: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let request = format!(
        "GET /ws HTTP/1.1\r\nHost: {addr}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.expect("write handshake");

    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await.expect("read handshake");
        assert!(n > 0, "server closed during handshake");
        head.extend_from_slice(&buf[..n]);
    }
    assert!(head.starts_with(b"HTTP/1.1 101"));
    stream
}

async fn wait_for_connection(registry: &ConnectionRegistry) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while registry.stats().active_connections == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection registered");
}

async fn assert_released(mut stream: TcpStream, ended: &mut mpsc::UnboundedReceiver<()>) {
    tokio::time::timeout(Duration::from_secs(8), ended.recv())
        .await
        .expect("session ended after server-side removal")
        .expect("session end signal");

    // socket 释放后对端读到 EOF（或 reset）。
    let mut rest = Vec::new();
    assert!(
        tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut rest))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn unregistered_silent_connection_is_torn_down() {
    let registry = Arc::new(ConnectionRegistry::new());
    let (addr, mut ended) = serve(registry.clone()).await;
    let stream = silent_client(addr).await;
    wait_for_connection(&registry).await;

    let id = registry.snapshot_all(&[])[0].id;
    assert!(registry.unregister(id));

    assert_released(stream, &mut ended).await;
    assert_eq!(registry.stats().active_connections, 0);
}

#[tokio::test]
async fn close_all_tears_down_silent_connections() {
    let registry = Arc::new(ConnectionRegistry::new());
    let (addr, mut ended) = serve(registry.clone()).await;
    let stream = silent_client(addr).await;
    wait_for_connection(&registry).await;

    assert_eq!(registry.close_all(), 1);

    assert_released(stream, &mut ended).await;
}
