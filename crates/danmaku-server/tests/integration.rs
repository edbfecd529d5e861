//! End-to-end tests against a listening server with real WebSocket clients.

use std::net::SocketAddr;
use std::time::Duration;

use danmaku_core::{AdminGate, BannedWords, DisplaySettings, Relay};
use danmaku_server::{DanmakuServer, ServerConfig};
use futures::{SinkExt, StreamExt};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const PASSWORD: &str = "letmein";

struct TestServer {
    server: DanmakuServer,
    addr: SocketAddr,
    task: tokio::task::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

async fn start_with(config: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = ServerConfig {
        static_dir: dir.path().join("public"),
        upload_dir: dir.path().join("uploads"),
        ..ServerConfig::default()
    };
    config(&mut cfg);
    let relay = Relay::new(
        DisplaySettings::default(),
        BannedWords::new(),
        AdminGate::new(PASSWORD),
    );
    let metrics = PrometheusBuilder::new().build_recorder().handle();
    let server = DanmakuServer::new(cfg, relay, metrics);
    let (addr, task) = server.listen().await.unwrap();
    TestServer {
        server,
        addr,
        task,
        _dir: dir,
    }
}

async fn start() -> TestServer {
    start_with(|_| {}).await
}

/// Connect and consume the initial `state` frame.
async fn connect(addr: SocketAddr) -> (Client, Value) {
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let state = recv(&mut ws).await;
    assert_eq!(state["type"], "state");
    (ws, state)
}

async fn send(ws: &mut Client, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

async fn recv(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Assert nothing arrives within a short window.
async fn assert_silent(ws: &mut Client) {
    let next = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(next.is_err(), "expected no frame, got {next:?}");
}

async fn login(ws: &mut Client) {
    send(ws, json!({"type": "adminLogin", "data": {"password": PASSWORD}})).await;
    let reply = recv(ws).await;
    assert_eq!(reply["type"], "adminLoginResult");
    assert_eq!(reply["data"]["ok"], true);
}

fn danmaku(text: &str) -> Value {
    json!({"type": "sendDanmaku", "data": {"text": text}})
}

#[tokio::test]
async fn connect_receives_defaults() {
    let ts = start().await;
    let (_ws, state) = connect(ts.addr).await;
    assert_eq!(
        state["data"],
        json!({
            "settings": {
                "barrageSpeed": 5,
                "barrageDensity": 5,
                "lanes": 10,
                "background": {"type": "none", "url": ""}
            },
            "bannedWords": []
        })
    );
}

#[tokio::test]
async fn admin_and_viewer_flow() {
    let ts = start().await;
    let (mut a, _) = connect(ts.addr).await;
    login(&mut a).await;
    let (mut b, _) = connect(ts.addr).await;

    send(&mut a, json!({"type": "adminUpdateSettings", "data": {"lanes": 5}})).await;
    for ws in [&mut a, &mut b] {
        let state = recv(ws).await;
        assert_eq!(state["type"], "state");
        assert_eq!(state["data"]["settings"]["lanes"], 5);
    }

    send(&mut b, json!({"type": "sendDanmaku", "data": {"text": "hi", "color": "#f00"}})).await;
    for ws in [&mut a, &mut b] {
        let msg = recv(ws).await;
        assert_eq!(msg["type"], "danmaku");
        assert_eq!(msg["data"], json!({"text": "hi", "color": "#f00", "lane": 0}));
    }

    send(&mut a, json!({"type": "adminAddBannedWord", "data": {"word": "spam"}})).await;
    for ws in [&mut a, &mut b] {
        let state = recv(ws).await;
        assert_eq!(state["data"]["bannedWords"], json!(["spam"]));
    }

    send(&mut b, danmaku("buy spam now")).await;
    let alert = recv(&mut b).await;
    assert_eq!(alert["type"], "bannedAlert");
    assert_eq!(
        alert["data"],
        json!({"ok": false, "error": "Message contains a banned word"})
    );
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn lanes_rotate_across_senders() {
    let ts = start().await;
    let (mut a, _) = connect(ts.addr).await;
    let (mut b, _) = connect(ts.addr).await;

    for i in 0..12 {
        let sender = if i % 2 == 0 { &mut a } else { &mut b };
        send(sender, danmaku(&format!("m{i}"))).await;
        let msg = recv(&mut a).await;
        assert_eq!(msg["data"]["text"], format!("m{i}"));
        assert_eq!(msg["data"]["lane"], i % 10);
        let _ = recv(&mut b).await;
    }
}

#[tokio::test]
async fn viewer_cannot_mutate() {
    let ts = start().await;
    let (mut a, _) = connect(ts.addr).await;
    let (mut b, _) = connect(ts.addr).await;

    send(&mut b, json!({"type": "adminAddBannedWord", "data": {"word": "hi"}})).await;
    send(&mut b, json!({"type": "adminUpdateSettings", "data": {"lanes": 4}})).await;
    send(
        &mut b,
        json!({"type": "adminSetBackground", "data": {"type": "image", "url": "/x.png"}}),
    )
    .await;
    send(&mut b, danmaku("hi")).await;

    for ws in [&mut a, &mut b] {
        let msg = recv(ws).await;
        assert_eq!(msg["type"], "danmaku");
        assert_eq!(msg["data"]["text"], "hi");
    }
    let (_c, state) = connect(ts.addr).await;
    assert_eq!(state["data"]["settings"]["lanes"], 10);
    assert_eq!(state["data"]["bannedWords"], json!([]));
}

#[tokio::test]
async fn wrong_password_is_reported_to_sender_only() {
    let ts = start().await;
    let (mut a, _) = connect(ts.addr).await;
    let (mut b, _) = connect(ts.addr).await;

    send(&mut a, json!({"type": "adminLogin", "data": {"password": "nope"}})).await;
    let reply = recv(&mut a).await;
    assert_eq!(
        reply,
        json!({"type": "adminLoginResult", "data": {"ok": false, "error": "Invalid password"}})
    );
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn background_change_reaches_everyone() {
    let ts = start().await;
    let (mut a, _) = connect(ts.addr).await;
    login(&mut a).await;
    let (mut b, _) = connect(ts.addr).await;

    let background = json!({"type": "video", "url": "/uploads/clip.mp4"});
    send(&mut a, json!({"type": "adminSetBackground", "data": background})).await;
    for ws in [&mut a, &mut b] {
        let state = recv(ws).await;
        assert_eq!(
            state["data"]["settings"]["background"],
            json!({"type": "video", "url": "/uploads/clip.mp4"})
        );
    }
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let ts = start().await;
    let (mut a, _) = connect(ts.addr).await;

    a.send(Message::Text("{not json".into())).await.unwrap();
    send(&mut a, json!({"type": "mystery", "data": {}})).await;
    send(&mut a, danmaku("   ")).await;
    a.send(Message::Binary(danmaku("bin").to_string().into_bytes().into()))
        .await
        .unwrap();

    let msg = recv(&mut a).await;
    assert_eq!(msg["data"]["text"], "bin");
    assert_eq!(msg["data"]["lane"], 0);
}

#[tokio::test]
async fn admin_status_does_not_survive_reconnect() {
    let ts = start().await;
    let (mut a, _) = connect(ts.addr).await;
    login(&mut a).await;
    a.close(None).await.unwrap();

    let (mut a2, _) = connect(ts.addr).await;
    send(&mut a2, json!({"type": "adminAddBannedWord", "data": {"word": "x"}})).await;
    assert_silent(&mut a2).await;
}

#[tokio::test]
async fn health_reports_connections() {
    let ts = start().await;
    let (_a, _) = connect(ts.addr).await;
    let (_b, _) = connect(ts.addr).await;

    let body: Value = reqwest::get(format!("http://{}/health", ts.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 2);
}

#[tokio::test]
async fn connection_limit_rejects_extra_clients() {
    let ts = start_with(|c| c.max_connections = 1).await;
    let (_a, _) = connect(ts.addr).await;
    let err = connect_async(format!("ws://{}/ws", ts.addr)).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn concurrent_upgrades_respect_limit() {
    let ts = start_with(|c| c.max_connections = 2).await;
    let url = format!("ws://{}/ws", ts.addr);
    let attempts = (0..6).map(|_| connect_async(url.clone()));
    let results = futures::future::join_all(attempts).await;

    let open: Vec<_> = results.into_iter().filter_map(Result::ok).collect();
    assert_eq!(open.len(), 2);
}

#[tokio::test]
async fn closed_session_frees_its_slot() {
    let ts = start_with(|c| c.max_connections = 1).await;
    let (mut a, _) = connect(ts.addr).await;
    a.close(None).await.unwrap();

    let url = format!("ws://{}/ws", ts.addr);
    let reconnected = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok((ws, _)) = connect_async(url.as_str()).await {
                return ws;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reconnected.is_ok(), "slot was not released after close");
}

#[tokio::test]
async fn upload_then_set_background() {
    let ts = start().await;
    let client = reqwest::Client::new();

    let part = reqwest::multipart::Part::bytes(b"GIF89a".to_vec())
        .file_name("bg.gif")
        .mime_str("image/gif")
        .unwrap();
    let form = reqwest::multipart::Form::new().part("file", part);
    let resp = client
        .post(format!("http://{}/upload", ts.addr))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["kind"], "image");
    let url = body["url"].as_str().unwrap().to_owned();

    let fetched = client
        .get(format!("http://{}{url}", ts.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(fetched.status(), 200);
    assert_eq!(&fetched.bytes().await.unwrap()[..], b"GIF89a");

    let (mut a, _) = connect(ts.addr).await;
    login(&mut a).await;
    send(
        &mut a,
        json!({"type": "adminSetBackground", "data": {"type": body["kind"], "url": url}}),
    )
    .await;
    let state = recv(&mut a).await;
    assert_eq!(state["data"]["settings"]["background"]["url"], body["url"]);
}

#[tokio::test]
async fn upload_rejects_text_file() {
    let ts = start().await;
    let part = reqwest::multipart::Part::bytes(b"hello".to_vec())
        .file_name("notes.txt")
        .mime_str("text/plain")
        .unwrap();
    let resp = reqwest::Client::new()
        .post(format!("http://{}/upload", ts.addr))
        .multipart(reqwest::multipart::Form::new().part("file", part))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn shutdown_closes_sessions() {
    let ts = start().await;
    let (mut a, _) = connect(ts.addr).await;
    ts.server.stop(ts.task).await;

    let end = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match a.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(end.is_ok(), "session was not closed on shutdown");
}
