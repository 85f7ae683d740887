//! `CodotServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use codot_rpc::{MethodRegistry, RpcContext};
use metrics::counter;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::game::run_game_session;
use crate::websocket::registry::{ClearSubscriptions, ConnectionRegistry};
use crate::websocket::session::run_ws_session;

/// Server startup failure.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen address could not be bound (port in use, permission).
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Other socket failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Command registry.
    pub registry: Arc<MethodRegistry>,
    /// Root handler context.
    pub ctx: RpcContext,
    /// Open client connections.
    pub connections: Arc<ConnectionRegistry>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
}

/// The Codot protocol server.
pub struct CodotServer {
    config: Arc<ServerConfig>,
    registry: Arc<MethodRegistry>,
    ctx: RpcContext,
    connections: Arc<ConnectionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl CodotServer {
    /// Create a server. Installs the connection registry as the event bus
    /// push sink and shares the context's shutdown token.
    pub fn new(config: ServerConfig, registry: MethodRegistry, ctx: RpcContext) -> Self {
        let registry = registry.with_handler_timeout(config.handler_timeout);
        let connections = Arc::new(ConnectionRegistry::new(config.max_connections));
        ctx.bus.set_sink(&connections);
        if config.clear_on_disconnect {
            connections.add_disconnect_hook(Arc::new(ClearSubscriptions::new(Arc::clone(&ctx.bus))));
        }
        let shutdown = Arc::new(ShutdownCoordinator::with_token(ctx.shutdown.clone()));
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            ctx,
            connections,
            shutdown,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            ctx: self.ctx.clone(),
            connections: Arc::clone(&self.connections),
            config: Arc::clone(&self.config),
            start_time: self.start_time,
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/game", get(game_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and start serving in the background.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    /// Bind failures are returned, never panicked on.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server terminated with error");
            }
        });
        info!(addr = %local_addr, "codot server listening");
        Ok((local_addr, handle))
    }

    /// Stop accepting, close every connection, and clear the registry.
    /// Idempotent.
    pub fn stop(&self) {
        if !self.shutdown.is_shutting_down() {
            info!(connections = self.connections.connection_count(), "stopping server");
        }
        self.shutdown.shutdown();
        let _ = self.connections.close_all();
    }

    /// Get the connection registry.
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the command registry.
    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    /// Get the root handler context.
    pub fn context(&self) -> &RpcContext {
        &self.ctx
    }
}

/// GET / and /ws: client WebSocket upgrade.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let Some(slot) = state.connections.try_reserve() else {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(max = state.config.max_connections, "connection limit reached, refusing upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    };
    let max_message_size = state.config.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, slot, state))
}

/// GET /game: game-process WebSocket upgrade.
async fn game_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let bridge = Arc::clone(&state.ctx.bridge);
    let queue = state.config.outbound_queue;
    let shutdown = state.ctx.shutdown.clone();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_game_session(socket, bridge, queue, shutdown))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.connections.connection_count(),
        state.ctx.bridge.has_active_session(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn make_server() -> CodotServer {
        CodotServer::new(ServerConfig::default(), MethodRegistry::new(), RpcContext::default())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["game_session_active"], false);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade() {
        let server = make_server();
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn bind_failure_is_an_error_value() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let server = CodotServer::new(
            ServerConfig {
                port,
                ..ServerConfig::default()
            },
            MethodRegistry::new(),
            RpcContext::default(),
        );
        let err = server.listen().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(err.to_string().contains(&port.to_string()));
    }

    #[test]
    fn dropping_server_frees_connection_registry() {
        let ctx = RpcContext::default();
        let server = CodotServer::new(
            ServerConfig {
                clear_on_disconnect: true,
                ..ServerConfig::default()
            },
            MethodRegistry::new(),
            ctx.clone(),
        );
        let registry = Arc::downgrade(server.connections());
        drop(server);
        assert!(registry.upgrade().is_none());

        // The bus outlives the server and keeps publishing.
        let _ = ctx.bus.publish(codot_events::EventType::GameStopped, serde_json::json!({}));
        assert_eq!(ctx.bus.queue_len(), 1);
    }

    #[tokio::test]
    async fn listen_on_ephemeral_port() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.stop();
        server.stop();
        assert!(server.shutdown().is_shutting_down());
        assert!(server.context().shutdown.is_cancelled());
        handle.await.unwrap();
    }
}
