//! `WorkerServer`: Axum HTTP + WebSocket listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use stagehand_core::stages::StageResolver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::handler::RequestHandler;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::transport::websocket;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Worker name reported by `/health`.
    pub name: Arc<str>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Target → stage plan lookup.
    pub resolver: Arc<dyn StageResolver>,
    /// Handler for accepted requests.
    pub handler: Arc<dyn RequestHandler>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics_handle: Option<PrometheusHandle>,
}

/// The worker's network front end.
pub struct WorkerServer {
    state: AppState,
}

impl WorkerServer {
    /// Create a new server.
    pub fn new(
        config: ServerConfig,
        resolver: Arc<dyn StageResolver>,
        handler: Arc<dyn RequestHandler>,
    ) -> Self {
        Self {
            state: AppState {
                name: Arc::from("stagehand"),
                config: Arc::new(config),
                resolver,
                handler,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                metrics_handle: None,
            },
        }
    }

    /// Set the name reported by `/health`.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.state.name = Arc::from(name);
        self
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics_handle = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), std::io::Error> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.state.shutdown.token();
        info!(%local_addr, "worker listening");

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server stopped with error");
            }
        });

        Ok((local_addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Live connection count.
    pub fn connection_count(&self) -> usize {
        self.state.shutdown.open_connections()
    }
}

/// GET /ws
async fn ws_handler(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let max_message_size = state.config.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| {
            let shutdown = Arc::clone(&state.shutdown);
            shutdown.track_connection(handle_socket(socket, state))
        })
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (source, sink) = websocket::split(socket);
    let connection = Connection::new(state.resolver, state.handler)
        .with_config(state.config.connection())
        .with_shutdown(state.shutdown.token());
    debug!(connection_id = connection.id(), "websocket upgraded");
    let _report = connection.run(source, sink).await;
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        &state.name,
        state.start_time,
        state.shutdown.open_connections(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
