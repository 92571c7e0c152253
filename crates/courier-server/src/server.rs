//! `RelayServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use courier_core::SessionRegistry;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Online users.
    pub registry: Arc<SessionRegistry>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics_handle: PrometheusHandle,
    /// Open `WebSocket` sockets.
    pub connections: Arc<AtomicUsize>,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    registry: Arc<SessionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics_handle: PrometheusHandle,
    connections: Arc<AtomicUsize>,
}

impl RelayServer {
    /// Create a server with an empty registry.
    pub fn new(config: ServerConfig, metrics_handle: PrometheusHandle) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics_handle,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
            connections: self.connections.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/websocket/{user_id}", get(ws_handler))
            .route("/push/{user_id}", post(push_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the listener and serve in a background task.
    ///
    /// Returns the bound address and the serve task. The task finishes after
    /// the shutdown token is cancelled and in-flight HTTP requests complete.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let serve =
                axum::serve(listener, app).with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = serve.await {
                error!(error = %e, "server exited with error");
            }
        });

        info!(%local_addr, "courier listening");
        Ok((local_addr, handle))
    }

    /// Cancel, wait for the serve task, then wait for sockets to close.
    ///
    /// Both waits share the configured shutdown timeout.
    pub async fn stop(&self, serve_handle: JoinHandle<()>) {
        let timeout = self.config.shutdown_timeout;
        let started = Instant::now();
        let _ = self
            .shutdown
            .graceful_shutdown(vec![serve_handle], timeout)
            .await;
        let remaining = timeout.saturating_sub(started.elapsed());
        if self.shutdown.wait_for_idle(&self.connections, remaining).await {
            info!("all connections closed");
        }
    }

    /// Get the session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open `WebSocket` sockets, including superseded ones.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let resp = health::health_check(
        state.start_time,
        state.registry.current_count(),
        state.connections.load(Ordering::SeqCst),
        state.registry.online_users(),
    );
    Json(resp)
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics_handle)
}

/// GET /websocket/{user_id}
async fn ws_handler(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if user_id.trim().is_empty() {
        warn!("rejecting upgrade with blank user id");
        return (StatusCode::BAD_REQUEST, "userId must not be blank").into_response();
    }
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let token = state.shutdown.token();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let _ = state.connections.fetch_add(1, Ordering::SeqCst);
            run_ws_session(
                socket,
                user_id,
                state.registry.clone(),
                state.config.clone(),
                token,
            )
            .await;
            let _ = state.connections.fetch_sub(1, Ordering::SeqCst);
        })
}

/// POST /push/{user_id}
///
/// The request body is forwarded verbatim as one text frame.
async fn push_handler(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    body: String,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.registry.send_to(&user_id, &body) {
        Ok(true) => (StatusCode::OK, Json(json!({ "delivered": true }))),
        Ok(false) => (StatusCode::NOT_FOUND, Json(json!({ "delivered": false }))),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "delivered": false, "error": e.to_string() })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::ChannelSession;
    use axum::body::Body;
    use axum::http::Request;
    use courier_core::ConnectionHandle;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn make_server() -> RelayServer {
        RelayServer::new(ServerConfig::default(), crate::metrics::detached_handle())
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn push_request(user_id: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/push/{user_id}"))
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[test]
    fn accessors() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.registry().current_count(), 0);
        assert_eq!(server.connection_count(), 0);
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn health_endpoint_reports_online() {
        let server = make_server();
        let (tx, _rx) = mpsc::channel(4);
        let _ = server.registry().register(Arc::new(ConnectionHandle::new(
            "alice",
            Arc::new(ChannelSession::new(tx)),
        )));

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["online"], 1);
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["users"], json!(["alice"]));
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_ok() {
        let server = make_server();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn blank_user_id_is_rejected() {
        let server = make_server();
        let req = Request::builder()
            .uri("/websocket/%20%20")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn plain_get_on_websocket_route_is_not_upgraded() {
        let server = make_server();
        let req = Request::builder()
            .uri("/websocket/alice")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
        assert_eq!(server.registry().current_count(), 0);
    }

    #[tokio::test]
    async fn upgrade_refused_while_shutting_down() {
        let server = make_server();
        server.shutdown().shutdown();
        let req = Request::builder()
            .uri("/websocket/alice")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn push_delivers_to_online_user() {
        let server = make_server();
        let (tx, mut rx) = mpsc::channel(4);
        let _ = server.registry().register(Arc::new(ConnectionHandle::new(
            "bob",
            Arc::new(ChannelSession::new(tx)),
        )));

        let resp = server
            .router()
            .oneshot(push_request("bob", r#"{"notice":"maintenance"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["delivered"], true);
        assert_eq!(rx.recv().await.as_deref(), Some(r#"{"notice":"maintenance"}"#));
    }

    #[tokio::test]
    async fn push_to_offline_user_is_not_found() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(push_request("ghost", "hello"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["delivered"], false);
    }

    #[tokio::test]
    async fn push_to_closed_session_is_bad_gateway() {
        let server = make_server();
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let _ = server.registry().register(Arc::new(ConnectionHandle::new(
            "carol",
            Arc::new(ChannelSession::new(tx)),
        )));

        let resp = server
            .router()
            .oneshot(push_request("carol", "hello"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["delivered"], false);
        assert!(parsed["error"].as_str().unwrap().contains("carol"));
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.stop(handle).await;
        assert!(server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn listen_reports_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let config = ServerConfig {
            port,
            ..ServerConfig::default()
        };
        let server = RelayServer::new(config, crate::metrics::detached_handle());
        let err = server.listen().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
