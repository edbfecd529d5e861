//! `DanmakuServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use danmaku_core::{Relay, SessionId};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::relay::{RelayHandle, spawn_relay};
use crate::upload::{self, UPLOADS_ROUTE, UploadError, UploadResponse};
use crate::websocket::broadcast::BroadcastManager;
use crate::websocket::session::{SessionLimits, run_ws_session};

/// Capacity of the relay command queue shared by all sessions.
const RELAY_QUEUE_CAPACITY: usize = 1024;

/// Time allowed for the listener, sessions and relay to finish on stop.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection registry used for fan-out.
    pub broadcast: Arc<BroadcastManager>,
    /// Sender side of the relay task.
    pub relay: RelayHandle,
    /// One permit per open session, `max_connections` in total.
    pub connections: Arc<Semaphore>,
    /// Tracks running sessions so `stop` can wait for them.
    pub sessions: TaskTracker,
    /// Cancelled when the server stops.
    pub shutdown: CancellationToken,
    /// When the server started.
    pub start_time: Instant,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The relay server.
///
/// Owns the relay task, the session tracker and the shutdown token. The
/// token stops the listener, every session and the relay; [`stop`] cancels
/// it and waits for all three.
///
/// [`stop`]: DanmakuServer::stop
pub struct DanmakuServer {
    config: Arc<ServerConfig>,
    broadcast: Arc<BroadcastManager>,
    relay: RelayHandle,
    relay_task: JoinHandle<()>,
    connections: Arc<Semaphore>,
    sessions: TaskTracker,
    shutdown: CancellationToken,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl DanmakuServer {
    /// Create a server and start its relay task.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: ServerConfig, relay: Relay, metrics: PrometheusHandle) -> Self {
        let broadcast = Arc::new(BroadcastManager::new());
        let shutdown = CancellationToken::new();
        let (relay, relay_task) = spawn_relay(
            relay,
            broadcast.clone(),
            RELAY_QUEUE_CAPACITY,
            shutdown.clone(),
        );
        Self {
            connections: Arc::new(Semaphore::new(config.max_connections)),
            config: Arc::new(config),
            broadcast,
            relay,
            relay_task,
            sessions: TaskTracker::new(),
            shutdown,
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            broadcast: self.broadcast.clone(),
            relay: self.relay.clone(),
            connections: self.connections.clone(),
            sessions: self.sessions.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            config: self.config.clone(),
            metrics: self.metrics.clone(),
        };
        let body_limit = DefaultBodyLimit::max(self.config.upload_max_bytes);

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/upload", post(upload_handler).layer(body_limit))
            .nest_service(UPLOADS_ROUTE, ServeDir::new(&self.config.upload_dir))
            .fallback_service(ServeDir::new(&self.config.static_dir))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve in the background.
    ///
    /// Returns the bound address and the serve task, which finishes once
    /// shutdown is signalled and in-flight requests drain.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.clone();

        info!(%addr, "danmaku relay listening");
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                warn!(error = %err, "server stopped with error");
            }
        });
        Ok((addr, handle))
    }

    /// Cancel the listener, every session and the relay, then wait for them.
    pub async fn stop(self, serve_task: JoinHandle<()>) {
        let Self {
            shutdown,
            sessions,
            relay_task,
            ..
        } = self;

        shutdown.cancel();
        let _ = sessions.close();
        info!(
            sessions = sessions.len(),
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "waiting for server tasks to finish"
        );

        let drain = async {
            let _ = serve_task.await;
            sessions.wait().await;
            let _ = relay_task.await;
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
            warn!("shutdown timed out after {SHUTDOWN_TIMEOUT:?}, some tasks may still be running");
        }
    }

    /// Get the connection registry.
    pub fn broadcast(&self) -> &Arc<BroadcastManager> {
        &self.broadcast
    }

    /// Get the relay handle.
    pub fn relay(&self) -> &RelayHandle {
        &self.relay
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws
///
/// A session holds one connection permit from before the upgrade until it
/// ends, so concurrent upgrades can never exceed `max_connections`.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_cancelled() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let Ok(permit) = state.connections.clone().try_acquire_owned() else {
        warn!(max = state.config.max_connections, "connection limit reached");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let limits = SessionLimits {
        ping_interval: state.config.heartbeat_interval(),
        pong_timeout: state.config.heartbeat_timeout(),
        queue_capacity: state.config.send_queue_capacity,
    };
    let AppState {
        broadcast,
        relay,
        sessions,
        shutdown,
        config,
        ..
    } = state;
    ws.max_message_size(config.max_message_size)
        .max_frame_size(config.max_message_size)
        .on_upgrade(move |socket| {
            let session =
                run_ws_session(socket, SessionId::new(), relay, broadcast, limits, shutdown);
            sessions.track_future(async move {
                session.await;
                drop(permit);
            })
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.broadcast.connection_count();
    Json(health::health_check(state.start_time, connections))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    metrics::render(&state.metrics)
}

/// POST /upload
async fn upload_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, UploadError> {
    upload::store_upload(&state.config.upload_dir, multipart)
        .await
        .map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use danmaku_core::{AdminGate, BannedWords, DisplaySettings};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    const BOUNDARY: &str = "danmaku-test-boundary";

    fn make_server(config: ServerConfig) -> DanmakuServer {
        let relay = Relay::new(
            DisplaySettings::default(),
            BannedWords::new(),
            AdminGate::new("pw"),
        );
        let metrics = PrometheusBuilder::new().build_recorder().handle();
        DanmakuServer::new(config, relay, metrics)
    }

    fn temp_config(dir: &tempfile::TempDir) -> ServerConfig {
        ServerConfig {
            static_dir: dir.path().join("public"),
            upload_dir: dir.path().join("uploads"),
            ..ServerConfig::default()
        }
    }

    fn multipart_request(file_name: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
                 Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn server_with_default_config() {
        let server = make_server(ServerConfig::default());
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert_eq!(server.broadcast().connection_count(), 0);
        assert_eq!(
            server.connections.available_permits(),
            server.config().max_connections
        );
    }

    #[tokio::test]
    async fn relay_is_running() {
        let server = make_server(ServerConfig::default());
        let snapshot = server.relay().snapshot().await.unwrap();
        assert_eq!(snapshot.settings, DisplaySettings::default());
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server(ServerConfig::default());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = json_body(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_text() {
        let server = make_server(ServerConfig::default());
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_without_upgrade_is_rejected() {
        let server = make_server(ServerConfig::default());
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn static_files_are_served() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);
        std::fs::create_dir_all(&config.static_dir).unwrap();
        std::fs::write(config.static_dir.join("index.html"), "<h1>screen</h1>").unwrap();
        let server = make_server(config);

        let req = Request::builder().uri("/index.html").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let req = Request::builder().uri("/missing.js").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_image_is_stored_and_served() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(temp_config(&dir));

        let resp = server
            .router()
            .oneshot(multipart_request("bg.png", "image/png", b"\x89PNGdata"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = json_body(resp).await;
        assert_eq!(parsed["ok"], true);
        assert_eq!(parsed["kind"], "image");
        let url = parsed["url"].as_str().unwrap().to_owned();
        assert!(url.starts_with("/uploads/"));
        assert!(url.ends_with(".png"));

        let req = Request::builder().uri(&url).body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(resp.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"\x89PNGdata");
    }

    #[tokio::test]
    async fn upload_name_cannot_choose_served_type() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(temp_config(&dir));
        let payload = b"<script>alert(1)</script>";

        let resp = server
            .router()
            .oneshot(multipart_request("evil.html", "image/png", payload))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let url = json_body(resp).await["url"].as_str().unwrap().to_owned();
        assert!(url.ends_with(".png"), "stored as {url}");
        assert!(!url.contains("evil"));

        let req = Request::builder().uri(&url).body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(resp.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }

    #[tokio::test]
    async fn upload_rejects_svg() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(temp_config(&dir));
        let resp = server
            .router()
            .oneshot(multipart_request("logo.svg", "image/svg+xml", b"<svg/>"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(std::fs::read_dir(dir.path().join("uploads")).is_err());
    }

    #[tokio::test]
    async fn upload_video_reports_kind() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(temp_config(&dir));
        let resp = server
            .router()
            .oneshot(multipart_request("clip.mp4", "video/mp4", b"frames"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["kind"], "video");
    }

    #[tokio::test]
    async fn upload_rejects_other_types() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(temp_config(&dir));
        let resp = server
            .router()
            .oneshot(multipart_request("notes.txt", "text/plain", b"hello"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let parsed = json_body(resp).await;
        assert_eq!(parsed["ok"], false);
        assert_eq!(parsed["error"], "unsupported content type: text/plain");
    }

    #[tokio::test]
    async fn upload_without_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(temp_config(&dir));
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"note\"\r\n\r\n\
             hi\r\n--{BOUNDARY}--\r\n"
        );
        let req = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "no file provided");
    }

    #[tokio::test]
    async fn upload_over_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            upload_max_bytes: 64,
            ..temp_config(&dir)
        };
        let server = make_server(config);
        let resp = server
            .router()
            .oneshot(multipart_request("big.png", "image/png", &[0u8; 1024]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(resp).await["ok"], false);
    }

    #[tokio::test]
    async fn stop_finishes_relay() {
        let server = make_server(ServerConfig::default());
        let relay = server.relay().clone();
        let (_addr, task) = server.listen().await.unwrap();
        server.stop(task).await;
        assert!(relay.snapshot().await.is_err());
    }

    #[tokio::test]
    async fn stop_waits_for_sessions() {
        let server = make_server(ServerConfig::default());
        let sessions = server.sessions.clone();
        let token = server.shutdown.clone();
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = finished.clone();
        drop(sessions.spawn(async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        }));

        let (_addr, task) = server.listen().await.unwrap();
        server.stop(task).await;
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
        assert!(sessions.is_closed());
    }
}
