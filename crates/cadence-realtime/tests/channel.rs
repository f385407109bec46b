//! End-to-end channel tests against a local tokio-tungstenite server.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cadence_core::SessionKey;
use cadence_notify::{NotificationKind, NotificationSink};
use cadence_realtime::{ChannelConfig, ChannelHub, ConnectionState, HubEvent, WsConnector};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_util::sync::CancellationToken;

struct TestServer {
    url: String,
    accepted: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<String>>>,
}

/// Accept connections forever. `handler` gets the zero-based connection
/// index and the upgraded socket.
async fn spawn_server<F, Fut>(handler: F) -> TestServer
where
    F: Fn(usize, WebSocketStream<TcpStream>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let paths = Arc::new(Mutex::new(Vec::new()));

    let counter = accepted.clone();
    let seen = paths.clone();
    let handler = Arc::new(handler);
    let _ = tokio::spawn(async move {
        loop {
            let Ok((tcp, _)) = listener.accept().await else { break };
            let seen = seen.clone();
            let ws = tokio_tungstenite::accept_hdr_async(tcp, move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                seen.lock().push(req.uri().path().to_owned());
                Ok(resp)
            })
            .await
            .unwrap();
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let _ = tokio::spawn(handler(index, ws));
        }
    });

    TestServer {
        url: format!("ws://{addr}/ws"),
        accepted,
        paths,
    }
}

async fn hold_open(mut ws: WebSocketStream<TcpStream>) {
    while let Some(Ok(_)) = ws.next().await {}
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn fast_config() -> ChannelConfig {
    ChannelConfig {
        reconnect_delay: Duration::from_millis(300),
        max_reconnect_attempts: 5,
        connect_timeout: Duration::from_secs(2),
    }
}

fn start_hub(url: &str, config: ChannelConfig) -> (Arc<ChannelHub>, CancellationToken) {
    let cancel = CancellationToken::new();
    let sink = Arc::new(NotificationSink::new(200));
    let (hub, _task) = ChannelHub::start(Arc::new(WsConnector::new(url)), config, sink, cancel.clone());
    (hub, cancel)
}

#[tokio::test]
async fn analysis_progress_then_complete_notifies_once() {
    let server = spawn_server(|_, mut ws| async move {
        ws.send(Message::Text(r#"{"type":"analysis_progress","progress":40}"#.into()))
            .await
            .unwrap();
        ws.send(Message::Text(r#"{"type":"analysis_complete"}"#.into()))
            .await
            .unwrap();
        hold_open(ws).await;
    })
    .await;

    let (hub, cancel) = start_hub(&server.url, fast_config());
    let mut events = hub.subscribe();
    let key = SessionKey::from("conv_abc123");
    hub.open(&key);

    let mut progress_seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await.unwrap() {
                HubEvent::Progress { progress, .. } => progress_seen.push(progress),
                HubEvent::AnalysisComplete { .. } => break,
                _ => {}
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(progress_seen, vec![40.0]);
    let notifications = hub.sink().list();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Success);
    assert_eq!(hub.sink().unread_count(), 1);
    assert_eq!(server.paths.lock().as_slice(), ["/ws/conv_abc123"]);

    cancel.cancel();
    hub.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn unexpected_close_reconnects_and_resets_counter() {
    let server = spawn_server(|index, mut ws| async move {
        if index == 0 {
            let _ = ws.close(None).await;
        } else {
            hold_open(ws).await;
        }
    })
    .await;

    let (hub, cancel) = start_hub(&server.url, fast_config());
    let key = SessionKey::from("room_1");
    hub.open(&key);

    let manager = hub.manager().clone();
    let accepted = server.accepted.clone();
    wait_until(|| accepted.load(Ordering::SeqCst) == 2 && manager.state(&key) == ConnectionState::Connected)
        .await;
    assert_eq!(manager.reconnect_attempts(&key), 0);

    cancel.cancel();
    hub.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn close_before_scheduled_reconnect_prevents_it() {
    let server = spawn_server(|_, mut ws| async move {
        let _ = ws.close(None).await;
    })
    .await;

    let config = ChannelConfig {
        reconnect_delay: Duration::from_millis(1500),
        ..fast_config()
    };
    let (hub, cancel) = start_hub(&server.url, config);
    let key = SessionKey::from("room_1");
    hub.open(&key);

    let manager = hub.manager().clone();
    wait_until(|| manager.reconnect_attempts(&key) == 1).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    hub.close(&key);

    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state(&key), ConnectionState::Disconnected);
    assert_eq!(hub.view(&key).unwrap().state, ConnectionState::Disconnected);

    cancel.cancel();
}

#[tokio::test]
async fn malformed_frame_does_not_stop_later_frames() {
    let server = spawn_server(|_, mut ws| async move {
        ws.send(Message::Text("{oops".into())).await.unwrap();
        ws.send(Message::Binary(vec![0xff].into())).await.unwrap();
        ws.send(Message::Text(r#"{"type":"user_joined","userId":"u1"}"#.into()))
            .await
            .unwrap();
        hold_open(ws).await;
    })
    .await;

    let (hub, cancel) = start_hub(&server.url, fast_config());
    let key = SessionKey::from("room_2");
    hub.open(&key);

    let view_hub = hub.clone();
    let view_key = key.clone();
    wait_until(move || {
        view_hub
            .view(&view_key)
            .is_some_and(|v| v.participants.contains_key("u1"))
    })
    .await;
    assert_eq!(hub.router().malformed_count(), 1);
    assert_eq!(hub.manager().state(&key), ConnectionState::Connected);

    cancel.cancel();
    hub.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn practice_chat_round_trip() {
    let server = spawn_server(|_, mut ws| async move {
        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let frame: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(frame["type"], "user_message");
            let content = frame["content"].as_str().unwrap_or_default().to_owned();
            for chunk in ["You said: ", content.as_str()] {
                let delta = serde_json::json!({"type": "assistant_delta", "content": chunk});
                ws.send(Message::Text(delta.to_string().into())).await.unwrap();
            }
            ws.send(Message::Text(r#"{"type":"assistant_done"}"#.into()))
                .await
                .unwrap();
        }
    })
    .await;

    let (hub, cancel) = start_hub(&server.url, fast_config());
    let key = SessionKey::from("practice_1");
    hub.open(&key);

    let manager = hub.manager().clone();
    wait_until(|| manager.state(&key) == ConnectionState::Connected).await;
    let _ = hub.send_user_message(&key, "hello").unwrap();

    let view_hub = hub.clone();
    let view_key = key.clone();
    wait_until(move || {
        view_hub
            .view(&view_key)
            .is_some_and(|v| v.transcript.len() == 2 && !v.transcript.is_streaming())
    })
    .await;

    let view = hub.view(&key).unwrap();
    let messages = view.transcript.messages();
    assert_eq!(messages[0].content, "hello");
    assert_eq!(messages[1].content, "You said: hello");

    cancel.cancel();
    hub.shutdown(Duration::from_secs(1)).await;
}
