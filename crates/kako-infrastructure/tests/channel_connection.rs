//! Integration tests for `ChannelConnection` against a local WebSocket server.

use futures::{SinkExt, StreamExt};
use kako_core::channel::{
    ChannelEvent, ChannelEventKind, ChannelKind, ClientFrame, ConnectionStatus, ServerFrame,
    UserMessage,
};
use kako_core::reconnect::ReconnectPolicy;
use kako_infrastructure::{ChannelConnection, ChannelOptions, StaticTokenProvider};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

type ServerWs = WebSocketStream<TcpStream>;

struct TestServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    uris: mpsc::UnboundedReceiver<String>,
}

impl TestServer {
    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Accepts connections forever, handing each upgraded socket to `handler`.
/// `accepted` counts handshakes as they are answered.
async fn spawn_server<F, Fut>(handler: F) -> TestServer
where
    F: Fn(ServerWs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let (uri_tx, uris) = mpsc::unbounded_channel();

    let counter = accepted.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let uri_tx = uri_tx.clone();
            let counter = counter.clone();
            let callback =
                move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = uri_tx.send(request.uri().to_string());
                    Ok(response)
                };
            let Ok(ws) = accept_hdr_async(stream, callback).await else {
                continue;
            };
            tokio::spawn(handler(ws));
        }
    });

    TestServer {
        addr,
        accepted,
        uris,
    }
}

fn options(max_attempts: u32, base_delay_ms: u64) -> ChannelOptions {
    ChannelOptions {
        policy: ReconnectPolicy::new(max_attempts, Duration::from_millis(base_delay_ms)),
        connect_timeout: Duration::from_secs(2),
    }
}

fn connection(server_url: &str, token: Option<&str>, options: ChannelOptions) -> ChannelConnection {
    ChannelConnection::new(
        ChannelKind::Chat,
        server_url,
        Arc::new(StaticTokenProvider::new(token.map(str::to_string))),
        options,
    )
}

/// Forwards every event of the given kinds into a channel.
fn record(
    connection: &ChannelConnection,
    kinds: &[ChannelEventKind],
) -> mpsc::UnboundedReceiver<ChannelEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    for kind in kinds {
        let tx = tx.clone();
        connection.on(*kind, move |event| {
            let _ = tx.send(event.clone());
        });
    }
    rx
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for channel event")
        .expect("event channel closed")
}

async fn idle(ws: ServerWs) {
    let (_sink, mut source) = ws.split();
    while let Some(Ok(_)) = source.next().await {}
}

#[tokio::test]
async fn connect_sends_token_and_delivers_frames_in_order() {
    let mut server = spawn_server(|ws: ServerWs| async move {
        let (mut sink, _source) = ws.split();
        for frame in [
            r#"{"type":"stream_start"}"#,
            "not json at all",
            r#"{"type":"stream","content":"Hel"}"#,
            r#"{"type":"stream","content":"lo"}"#,
            r#"{"type":"stream_end"}"#,
        ] {
            sink.send(Message::Text(frame.into())).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    })
    .await;

    let conn = connection(&server.url(), Some("secret token"), options(5, 1000));
    let mut events = record(
        &conn,
        &[
            ChannelEventKind::Connected,
            ChannelEventKind::Message,
            ChannelEventKind::Warning,
        ],
    );

    conn.connect().await.unwrap();
    assert!(conn.is_open());

    let uri = server.uris.recv().await.unwrap();
    assert_eq!(uri, "/ws/chat?token=secret+token");

    assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        ChannelEvent::Message(ServerFrame::StreamStart)
    );
    assert!(matches!(next_event(&mut events).await, ChannelEvent::Warning(_)));
    assert_eq!(
        next_event(&mut events).await,
        ChannelEvent::Message(ServerFrame::StreamToken { content: "Hel".into() })
    );
    assert_eq!(
        next_event(&mut events).await,
        ChannelEvent::Message(ServerFrame::StreamToken { content: "lo".into() })
    );
    assert_eq!(
        next_event(&mut events).await,
        ChannelEvent::Message(ServerFrame::StreamEnd {
            content: None,
            error: None
        })
    );
    assert!(conn.is_open(), "a malformed frame must not close the channel");

    conn.disconnect();
}

#[tokio::test]
async fn ping_is_answered_with_a_single_pong() {
    let (pongs_tx, mut pongs) = mpsc::unbounded_channel::<usize>();
    let server = spawn_server(move |ws: ServerWs| {
        let pongs_tx = pongs_tx.clone();
        async move {
            let (mut sink, mut source) = ws.split();
            sink.send(Message::Ping("hb".into())).await.unwrap();

            let mut count = 0;
            let window = tokio::time::sleep(Duration::from_millis(500));
            tokio::pin!(window);
            loop {
                tokio::select! {
                    _ = &mut window => break,
                    message = source.next() => match message {
                        Some(Ok(Message::Pong(data))) => {
                            assert_eq!(&data[..], b"hb");
                            count += 1;
                        }
                        Some(Ok(_)) => {}
                        _ => break,
                    },
                }
            }
            let _ = pongs_tx.send(count);
        }
    })
    .await;

    let conn = connection(&server.url(), None, options(5, 1000));
    conn.connect().await.unwrap();

    let count = tokio::time::timeout(Duration::from_secs(5), pongs.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(count, 1);
    conn.disconnect();
}

#[tokio::test]
async fn send_reaches_server_only_while_open() {
    let (received_tx, mut received) = mpsc::unbounded_channel::<String>();
    let server = spawn_server(move |ws: ServerWs| {
        let received_tx = received_tx.clone();
        async move {
            let (_sink, mut source) = ws.split();
            while let Some(Ok(message)) = source.next().await {
                if let Message::Text(text) = message {
                    let _ = received_tx.send(text.as_str().to_string());
                }
            }
        }
    })
    .await;

    let conn = connection(&server.url(), None, options(5, 1000));
    let frame = ClientFrame::Message(UserMessage {
        content: "hello".into(),
        session_id: "web:chat:test".into(),
        model: None,
        exclude_tools: vec!["shell".into()],
    });

    assert!(!conn.send(&frame));

    conn.connect().await.unwrap();
    assert!(conn.send(&frame));

    let text = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await
        .unwrap()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["type"], "message");
    assert_eq!(value["session_id"], "web:chat:test");
    assert_eq!(value["exclude_tools"], serde_json::json!(["shell"]));

    conn.disconnect();
    assert!(!conn.send(&frame));
}

#[tokio::test]
async fn unexpected_close_reconnects() {
    let server = spawn_server(|ws: ServerWs| async move {
        let (mut sink, _source) = ws.split();
        let _ = sink.send(Message::Close(None)).await;
    })
    .await;

    let conn = connection(&server.url(), None, options(5, 50));
    let mut events = record(
        &conn,
        &[ChannelEventKind::Connected, ChannelEventKind::Disconnected],
    );

    conn.connect().await.unwrap();
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
    assert!(matches!(
        next_event(&mut events).await,
        ChannelEvent::Disconnected { .. }
    ));
    assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
    assert!(server.accepted() >= 2);

    conn.disconnect();
}

#[tokio::test]
async fn disconnect_during_pending_reconnect_stops_further_attempts() {
    let server = spawn_server(|ws: ServerWs| async move {
        let (mut sink, _source) = ws.split();
        let _ = sink.send(Message::Close(None)).await;
    })
    .await;

    let conn = connection(&server.url(), None, options(5, 300));
    let mut events = record(&conn, &[ChannelEventKind::Disconnected]);

    conn.connect().await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ChannelEvent::Disconnected { .. }
    ));

    // The first reconnect is now waiting on its 300ms timer.
    conn.disconnect();
    tokio::time::sleep(Duration::from_millis(900)).await;

    assert_eq!(server.accepted(), 1);
    assert_eq!(conn.state().status, ConnectionStatus::Closed);

    // An explicit connect starts over.
    conn.connect().await.unwrap();
    assert_eq!(server.accepted(), 2);
    conn.disconnect();
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    // Reserve a port, then close it so every handshake is refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let conn = connection(&format!("http://{}", addr), None, options(2, 10));
    let mut events = record(&conn, &[ChannelEventKind::PermanentlyDisconnected]);

    let err = conn.connect().await.unwrap_err();
    assert!(err.is_transient());

    assert_eq!(
        next_event(&mut events).await,
        ChannelEvent::PermanentlyDisconnected { attempts: 2 }
    );
    let state = conn.state();
    assert_eq!(state.status, ConnectionStatus::Closed);
    assert_eq!(state.attempt, 3);
}

#[tokio::test]
async fn manual_connect_resets_attempts() {
    let server = spawn_server(idle).await;

    let conn = connection(&server.url(), None, options(5, 1000));
    conn.connect().await.unwrap();
    assert_eq!(conn.state().attempt, 0);
    assert_eq!(conn.state().channel_url, format!("ws://{}/ws/chat", server.addr));

    // Reconnecting an open channel replaces the session.
    conn.connect().await.unwrap();
    assert!(conn.is_open());
    assert_eq!(server.accepted(), 2);
    conn.disconnect();
}
