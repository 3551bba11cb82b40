//! `ParleyServer`: Axum HTTP + WebSocket chat server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use parley_auth::CredentialStore;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::errors::{Result, ServerError};
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::SessionRegistry;
use crate::websocket::handler::MessageRouter;
use crate::websocket::session::{run_test_session, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Request router shared by every chat session.
    pub router: Arc<MessageRouter>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder was installed.
    pub metrics: Option<PrometheusHandle>,
    /// One permit per allowed concurrent chat connection.
    pub connection_slots: Arc<Semaphore>,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue depth.
    pub send_queue_capacity: usize,
}

/// The chat server.
pub struct ParleyServer {
    config: ServerConfig,
    router: Arc<MessageRouter>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    connection_slots: Arc<Semaphore>,
    start_time: Instant,
}

impl ParleyServer {
    /// Create a server over an already-loaded credential store.
    pub fn new(config: ServerConfig, store: Arc<CredentialStore>) -> Self {
        let router = MessageRouter::new(store, Arc::new(SessionRegistry::new()))
            .with_echo_to_sender(config.echo_to_sender);
        let slots = config.max_connections.min(Semaphore::MAX_PERMITS);
        let connection_slots = Arc::new(Semaphore::new(slots));
        Self {
            config,
            router: Arc::new(router),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            connection_slots,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from this Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            router: self.router.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            connection_slots: self.connection_slots.clone(),
            max_message_size: self.config.max_message_size,
            send_queue_capacity: self.config.send_queue_capacity,
        };

        Router::new()
            .route("/chat", get(chat_handler))
            .route("/test", get(test_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and start serving in the background.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which finishes after [`ShutdownCoordinator::shutdown`].
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::bind(addr.clone(), e))?;
        let local_addr = listener.local_addr()?;

        info!(%local_addr, max_connections = self.config.max_connections, "chat server listening");

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server terminated with error");
            }
            info!("chat server stopped");
        });

        Ok((local_addr, handle))
    }

    /// The live session registry.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        self.router.sessions()
    }

    /// The credential store.
    pub fn store(&self) -> &Arc<CredentialStore> {
        self.router.store()
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /chat: upgrade to a chat session.
async fn chat_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let Ok(permit) = state.connection_slots.clone().try_acquire_owned() else {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!("connection limit reached, rejecting chat client");
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    };

    let client_id = Uuid::now_v7().to_string();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            run_ws_session(
                socket,
                client_id,
                state.router,
                state.send_queue_capacity,
                state.shutdown.token(),
            )
            .await;
            drop(permit);
        })
}

/// GET /test: legacy fixed-reply endpoint.
async fn test_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let client_id = Uuid::now_v7().to_string();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| run_test_session(socket, client_id, state.shutdown.token()))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let sessions = state.router.sessions();
    let resp = health::health_check(
        state.start_time,
        sessions.connection_count().await,
        sessions.authenticated_count().await,
        state.shutdown.is_shutting_down(),
    );
    Json(resp)
}

/// GET /metrics: Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
