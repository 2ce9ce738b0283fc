//! WebSocket manager behavior against in-process servers
//!
//! Each test binds a `TcpListener` on an ephemeral port, runs a scripted
//! tokio-tungstenite acceptor, and points a `WsConnectionManager` at it.
//! Frames the client writes are collected for wire-shape assertions.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use roomlink_chat::error::ChatError;
use roomlink_chat::models::Message;
use roomlink_chat::transport::{
    ClientFrame, ConnectionState, ServerFrame, Transport, TransportEvent, WsConnectionManager,
};

const FAST_RECONNECT: Duration = Duration::from_millis(100);
const IDLE_PING: Duration = Duration::from_secs(30);

// ============================================================================
// Helpers
// ============================================================================

fn sample_message() -> Message {
    Message {
        id: "m1".into(),
        sender_id: "u1".into(),
        receiver_id: "u2".into(),
        message: "See you at the viewing".into(),
        created_at: "2024-05-01T10:00:00Z".parse().unwrap(),
        read: None,
        sender: None,
    }
}

/// Server that accepts any number of connections, holds them open, and
/// forwards every text frame it reads.
async fn collecting_server() -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(frame)) = ws.next().await {
                    if let WsMessage::Text(text) = frame {
                        let _ = tx.send(text.to_string());
                    }
                }
            });
        }
    });
    (url, rx)
}

async fn next_text(rx: &mut mpsc::UnboundedReceiver<String>) -> serde_json::Value {
    let text = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a client frame")
        .expect("server channel closed");
    serde_json::from_str(&text).expect("client frame was not JSON")
}

async fn next_event(rx: &mut broadcast::Receiver<TransportEvent>) -> TransportEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a transport event")
        .expect("transport event channel closed")
}

// ============================================================================
// Connect and announce
// ============================================================================

#[tokio::test]
async fn test_connect_announces_presence_first() {
    let (url, mut frames) = collecting_server().await;
    let manager = WsConnectionManager::new(&url, "u1", FAST_RECONNECT, IDLE_PING);
    let mut events = manager.subscribe();

    manager.connect().await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        TransportEvent::Connected
    ));
    assert_eq!(manager.state(), ConnectionState::Connected);

    let first = next_text(&mut frames).await;
    assert_eq!(
        first,
        serde_json::json!({"event": "user:join", "data": "u1"})
    );

    manager.disconnect().await;
}

#[tokio::test]
async fn test_emit_delivers_after_the_announce() {
    let (url, mut frames) = collecting_server().await;
    let manager = WsConnectionManager::new(&url, "u1", FAST_RECONNECT, IDLE_PING);
    let mut events = manager.subscribe();

    manager.connect().await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        TransportEvent::Connected
    ));

    manager
        .emit(ClientFrame::MessageSend(sample_message()))
        .await
        .unwrap();

    let first = next_text(&mut frames).await;
    assert_eq!(first["event"], "user:join");

    let second = next_text(&mut frames).await;
    assert_eq!(second["event"], "message:send");
    assert_eq!(second["data"]["id"], "m1");
    assert_eq!(second["data"]["receiverId"], "u2");
    assert_eq!(second["data"]["message"], "See you at the viewing");

    manager.disconnect().await;
}

#[tokio::test]
async fn test_second_connect_is_a_guarded_noop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (conn_tx, mut conns) = mpsc::unbounded_channel::<()>();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let _ = conn_tx.send(());
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    let manager = WsConnectionManager::new(&url, "u1", FAST_RECONNECT, IDLE_PING);
    let mut events = manager.subscribe();
    manager.connect().await.unwrap();
    manager.connect().await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        TransportEvent::Connected
    ));

    // exactly one dial reaches the server
    assert!(timeout(Duration::from_secs(5), conns.recv()).await.is_ok());
    assert!(timeout(Duration::from_millis(300), conns.recv())
        .await
        .is_err());

    manager.disconnect().await;
}

#[tokio::test]
async fn test_emit_without_a_connection_is_refused() {
    let manager = WsConnectionManager::new("ws://127.0.0.1:9", "u1", FAST_RECONNECT, IDLE_PING);
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    let err = manager
        .emit(ClientFrame::MessageSend(sample_message()))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotConnected));
}

// ============================================================================
// Inbound frames
// ============================================================================

#[tokio::test]
async fn test_inbound_frames_are_fanned_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        // swallow the announce, then push one message at the client
        let _ = ws.next().await;
        let frame = serde_json::json!({
            "event": "message:receive",
            "data": {
                "id": "m7",
                "senderId": "u2",
                "receiverId": "u1",
                "message": "When can I view the room?",
                "createdAt": "2024-05-01T10:00:00Z"
            }
        });
        ws.send(WsMessage::Text(frame.to_string().into()))
            .await
            .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let manager = WsConnectionManager::new(&url, "u1", FAST_RECONNECT, IDLE_PING);
    let mut events = manager.subscribe();
    manager.connect().await.unwrap();

    loop {
        match next_event(&mut events).await {
            TransportEvent::Frame(ServerFrame::MessageReceive(message)) => {
                assert_eq!(message.id, "m7");
                assert_eq!(message.sender_id, "u2");
                assert_eq!(message.message, "When can I view the room?");
                break;
            }
            TransportEvent::Connected => {}
            other => panic!("unexpected transport event: {other:?}"),
        }
    }

    manager.disconnect().await;
}

#[tokio::test]
async fn test_unparseable_inbound_frames_are_skipped() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _ = ws.next().await;
        // garbage, an unknown event, then a real receipt
        ws.send(WsMessage::Text("not json at all".into()))
            .await
            .unwrap();
        ws.send(
            WsMessage::Text(r#"{"event":"listing:update","data":{}}"#.into()),
        )
        .await
        .unwrap();
        ws.send(WsMessage::Text(
            r#"{"event":"message:read","data":{"userId":"u2"}}"#.into(),
        ))
        .await
        .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let manager = WsConnectionManager::new(&url, "u1", FAST_RECONNECT, IDLE_PING);
    let mut events = manager.subscribe();
    manager.connect().await.unwrap();

    // the first frame to arrive is the receipt; the junk never surfaces
    loop {
        match next_event(&mut events).await {
            TransportEvent::Frame(ServerFrame::MessageRead(receipt)) => {
                assert_eq!(receipt.user_id, "u2");
                break;
            }
            TransportEvent::Connected => {}
            other => panic!("unexpected transport event: {other:?}"),
        }
    }

    manager.disconnect().await;
}

// ============================================================================
// Teardown and recovery
// ============================================================================

#[tokio::test]
async fn test_disconnect_is_reported_once_and_idempotent() {
    let (url, mut frames) = collecting_server().await;
    let manager = WsConnectionManager::new(&url, "u1", FAST_RECONNECT, IDLE_PING);
    let mut events = manager.subscribe();

    manager.connect().await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        TransportEvent::Connected
    ));
    let _ = next_text(&mut frames).await;

    manager.disconnect().await;
    assert!(matches!(
        next_event(&mut events).await,
        TransportEvent::Disconnected
    ));
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    // a second disconnect neither panics nor emits again
    manager.disconnect().await;
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn test_redials_and_reannounces_after_the_server_drops() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (tx, mut frames) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        // first connection: read the announce, then kill it
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        if let Some(Ok(WsMessage::Text(text))) = ws.next().await {
            let _ = tx.send(text.to_string());
        }
        drop(ws);
        // second connection: read the announce and hold
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(frame)) = ws.next().await {
            if let WsMessage::Text(text) = frame {
                let _ = tx.send(text.to_string());
            }
        }
    });

    let manager = WsConnectionManager::new(&url, "u1", FAST_RECONNECT, IDLE_PING);
    let mut events = manager.subscribe();
    manager.connect().await.unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        TransportEvent::Connected
    ));
    assert!(matches!(
        next_event(&mut events).await,
        TransportEvent::Disconnected
    ));
    assert!(matches!(
        next_event(&mut events).await,
        TransportEvent::Connected
    ));
    assert_eq!(manager.state(), ConnectionState::Connected);

    // both connections saw the presence announce
    let join = serde_json::json!({"event": "user:join", "data": "u1"});
    assert_eq!(next_text(&mut frames).await, join);
    assert_eq!(next_text(&mut frames).await, join);

    manager.disconnect().await;
}
