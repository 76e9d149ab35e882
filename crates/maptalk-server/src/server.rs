//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::coordinator::{InboundMessage, RelayStats, run_coordinator};
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::RelayShutdown;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session::{SessionContext, serve_socket};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Runtime configuration.
    pub config: Arc<ServerConfig>,
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Store sizes published by the coordinator.
    pub stats: Arc<RelayStats>,
    /// Channel into the coordinator.
    pub inbound: mpsc::Sender<InboundMessage>,
    /// Shutdown signal and session tracking.
    pub shutdown: RelayShutdown,
    /// When the server started.
    pub start_time: Instant,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    registry: Arc<ConnectionRegistry>,
    stats: Arc<RelayStats>,
    shutdown: RelayShutdown,
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    start_time: Instant,
}

/// Handle to a listening server.
pub struct ServerHandle {
    addr: SocketAddr,
    server: JoinHandle<()>,
    coordinator: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Background tasks, for [`RelayShutdown::drain`].
    pub fn into_tasks(self) -> Vec<JoinHandle<()>> {
        vec![self.server, self.coordinator]
    }
}

impl RelayServer {
    /// Create a new server. Nothing is bound until [`listen`](Self::listen).
    pub fn new(config: ServerConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_queue_capacity.max(1));
        Self {
            registry: Arc::new(ConnectionRegistry::new(
                config.send_queue_capacity,
                config.max_connections,
            )),
            config: Arc::new(config),
            stats: Arc::new(RelayStats::default()),
            shutdown: RelayShutdown::new(),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
            stats: Arc::clone(&self.stats),
            inbound: self.inbound_tx.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler))
            .with_state(state)
            .layer(cors_layer(&self.config))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the listener and start the coordinator and HTTP server.
    pub async fn listen(&self) -> Result<ServerHandle, ServerError> {
        let inbound_rx = self
            .inbound_rx
            .lock()
            .take()
            .ok_or(ServerError::AlreadyListening)?;

        let addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let coordinator = tokio::spawn(run_coordinator(
            inbound_rx,
            Arc::clone(&self.registry),
            Arc::clone(&self.stats),
            self.shutdown.coordinator_token(),
        ));

        let app = self.router();
        let token = self.shutdown.session_token();
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                warn!(error = %e, "http server exited with error");
            }
        });

        info!(addr = %local_addr, "relay listening");
        Ok(ServerHandle {
            addr: local_addr,
            server,
            coordinator,
        })
    }

    /// Live connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Shutdown signal; [`RelayShutdown::drain`] stops the relay.
    pub fn shutdown(&self) -> &RelayShutdown {
        &self.shutdown
    }

    /// Store sizes as last published by the coordinator.
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Runtime configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins = if config.allows_any_origin() {
        AllowOrigin::any()
    } else {
        let list: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring unparseable allowed origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(list)
    };
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.count(),
        state.stats.online_users(),
        state.stats.rooms(),
    ))
}

/// GET /ws
///
/// Origin and capacity are checked before the upgrade itself so refused
/// clients get a plain HTTP status.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Some(origin) = headers.get(header::ORIGIN) {
        let origin = origin.to_str().unwrap_or_default();
        if !state.config.origin_allowed(origin) {
            warn!(origin, "rejecting websocket from disallowed origin");
            return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
        }
    }
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let Some(slot) = state.registry.try_reserve() else {
        warn!(
            max = state.config.max_connections,
            "connection limit reached, refusing upgrade"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let ctx = SessionContext {
        registry: state.registry,
        inbound: state.inbound,
        ping_interval: state.config.heartbeat_interval(),
        pong_timeout: state.config.heartbeat_timeout(),
        shutdown: state.shutdown.session_token(),
    };
    let shutdown = state.shutdown;
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| shutdown.track_session(serve_socket(socket, ctx, slot)))
}
