//! Axum HTTP and WebSocket server: routes, upgrade handling and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use switchboard_core::ClientId;
use switchboard_telemetry::metrics::{render, RELAY_REJECTED_TOTAL};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::health::health_check;
use crate::registry::Registry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::{ClientHandle, CloseReason};
use crate::websocket::heartbeat::{run_heartbeat, HeartbeatResult};
use crate::websocket::session::{run_session, run_writer, InboundFrame};

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live connections by identifier.
    pub registry: Arc<Registry>,
    /// Root of every connection's close signal.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Effective configuration.
    pub config: Arc<ServerConfig>,
    /// Rendered by `/metrics`; `None` when metrics are disabled.
    pub metrics: Option<PrometheusHandle>,
    /// One task per upgraded socket, drained on shutdown.
    pub sessions: TaskTracker,
    /// For `/health` uptime.
    pub start_time: Instant,
}

impl AppState {
    /// Fresh state with an empty registry.
    pub fn new(config: ServerConfig, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            config: Arc::new(config),
            metrics,
            sessions: TaskTracker::new(),
            start_time: Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind the listener and start serving. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    metrics: Option<PrometheusHandle>,
) -> Result<ServerHandle, std::io::Error> {
    let addr = config.bind_addr();
    let shutdown_timeout = config.shutdown_timeout();
    let state = AppState::new(config, metrics);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "switchboard listening");

    let router = build_router(state.clone());
    let token = state.shutdown.token();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
        {
            error!(error = %e, "server error");
        }
    });

    Ok(ServerHandle {
        local_addr,
        state,
        shutdown_timeout,
        server,
    })
}

/// Handle returned by [`start`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    state: AppState,
    shutdown_timeout: Duration,
    server: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Bound port; useful when configured with port 0.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// The live registry, for inspection.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.state.registry
    }

    /// Stop accepting connections, close every session with a close frame
    /// and wait for teardown to finish. Sessions and the listener share one
    /// `shutdownTimeoutSecs` deadline.
    pub async fn shutdown(self) {
        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        let drained = self
            .state
            .shutdown
            .graceful_shutdown(&self.state.sessions, self.shutdown_timeout)
            .await;
        if tokio::time::timeout_at(deadline, self.server).await.is_err() {
            warn!("listener did not stop within the shutdown timeout");
        }
        info!(drained, "server stopped");
    }
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

/// WebSocket upgrade handler. The identifier is checked before the upgrade
/// so a missing one gets a plain 400.
async fn ws_handler(
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(client_id) = params.user_id.and_then(ClientId::parse) else {
        counter!(RELAY_REJECTED_TOTAL).increment(1);
        warn!("connection rejected: userId query parameter is missing");
        return (StatusCode::BAD_REQUEST, "userId query parameter is required").into_response();
    };
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server shutting down").into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(client_id = %client_id, error = %rejection, "websocket upgrade rejected");
            return rejection.into_response();
        }
    };

    let sessions = state.sessions.clone();
    ws.max_message_size(state.config.max_message_size)
        .on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| sessions.track_future(handle_socket(socket, client_id, state)))
}

/// Wire one upgraded socket to a writer task, an optional heartbeat
/// monitor and the session loop.
async fn handle_socket(socket: WebSocket, client_id: ClientId, state: AppState) {
    let (sink, stream) = socket.split();
    let (handle, rx) = ClientHandle::channel(
        client_id,
        state.config.send_queue_capacity,
        &state.shutdown.token(),
    );
    let heartbeat = state.config.heartbeat();

    let writer = tokio::spawn(run_writer(
        sink,
        rx,
        handle.clone(),
        heartbeat.map(|hb| hb.interval),
    ));

    if let Some(hb) = heartbeat {
        let handle = handle.clone();
        let _ = tokio::spawn(async move {
            if run_heartbeat(handle.clone(), hb).await == HeartbeatResult::TimedOut {
                warn!(
                    client_id = %handle.client_id(),
                    conn_id = %handle.conn_id(),
                    idle_secs = handle.idle_for().as_secs(),
                    "client unresponsive, closing"
                );
                handle.close(CloseReason::HeartbeatTimeout);
            }
        });
    }

    let inbound = stream.map(|msg| msg.map(InboundFrame::from));
    let _ = run_session(handle, state.registry.clone(), inbound).await;

    if let Err(e) = writer.await {
        debug!(error = %e, "writer task ended abnormally");
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(health_check(state.start_time, state.registry.len()))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(handle),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
