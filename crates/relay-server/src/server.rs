//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router};
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use relay_runtime::SessionService;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::rpc::context::RpcContext;
use crate::rpc::registry::MethodRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::SocketConfig;
use crate::websocket::chat_session::run_chat_session;
use crate::websocket::rpc_session::run_rpc_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session and stream registries.
    pub service: Arc<SessionService>,
    /// RPC method registry.
    pub registry: Arc<MethodRegistry>,
    /// Context handed to RPC handlers.
    pub rpc_context: Arc<RpcContext>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// One permit per open socket.
    pub connections: Arc<Semaphore>,
    /// Permit count `connections` started with.
    pub max_connections: usize,
    /// Per-socket limits.
    pub socket: SocketConfig,
    /// Largest accepted WebSocket message.
    pub max_message_size: usize,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

impl AppState {
    /// Open sockets right now.
    pub fn connection_count(&self) -> usize {
        self.max_connections
            .saturating_sub(self.connections.available_permits())
    }

    fn acquire_connection(&self) -> Option<OwnedSemaphorePermit> {
        self.connections.clone().try_acquire_owned().ok()
    }
}

/// The relay server.
pub struct RelayServer {
    config: ServerConfig,
    state: AppState,
}

impl RelayServer {
    /// Create a server over fresh registries sized from `config`.
    pub fn new(config: ServerConfig, registry: MethodRegistry, metrics: PrometheusHandle) -> Self {
        let service = Arc::new(SessionService::new(config.max_sessions));
        let rpc_context = Arc::new(RpcContext::new(service.clone(), config.max_username_len));
        let state = AppState {
            service,
            registry: Arc::new(registry),
            rpc_context,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            connections: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
            socket: SocketConfig::from(&config),
            max_message_size: config.max_message_size,
            start_time: Instant::now(),
            metrics,
        };
        Self { config, state }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .route("/chat", get(chat_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.state.shutdown.token();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        });

        info!(%addr, "relay server listening");
        Ok((addr, handle))
    }

    /// Session service shared by every connection.
    pub fn service(&self) -> &Arc<SessionService> {
        &self.state.service
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the method registry.
    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.state.registry
    }

    /// Open sockets right now.
    pub fn connection_count(&self) -> usize {
        self.state.connection_count()
    }
}

fn too_many_connections(state: &AppState) -> Response {
    counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
    warn!(max_connections = state.max_connections, "connection limit reached, rejecting upgrade");
    (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response()
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.connection_count(),
        state.service.sessions().len(),
        state.service.streams().len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(&state.metrics),
    )
}

/// GET /ws: request/response RPC socket.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(permit) = state.acquire_connection() else {
        return too_many_connections(&state);
    };
    let registry = state.registry.clone();
    let ctx = state.rpc_context.clone();
    let shutdown = state.shutdown.token();
    let socket = state.socket;

    ws.max_message_size(state.max_message_size)
        .max_frame_size(state.max_message_size)
        .on_upgrade(move |ws| async move {
            let _permit = permit;
            run_rpc_session(ws, registry, ctx, socket, shutdown).await;
        })
}

/// GET /chat: bidirectional chat stream.
async fn chat_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(permit) = state.acquire_connection() else {
        return too_many_connections(&state);
    };
    let service = state.service.clone();
    let shutdown = state.shutdown.token();
    let socket = state.socket;

    ws.max_message_size(state.max_message_size)
        .max_frame_size(state.max_message_size)
        .on_upgrade(move |ws| async move {
            let _permit = permit;
            run_chat_session(ws, service, socket, shutdown).await;
        })
}
