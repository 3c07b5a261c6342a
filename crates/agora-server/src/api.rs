use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use agora_shared::constants::{HEALTH_PATH, LIVE_CHANNEL_PATH, MESSAGES_PATH};
use agora_shared::ChatMessage;

use crate::config::{AllowedOrigins, ServerConfig};
use crate::error::ServerError;
use crate::room::ChatRoom;
use crate::store::MessageStore;

#[derive(Clone)]
pub struct AppState {
    pub room: Arc<ChatRoom>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, MessageStore::new())
    }

    /// Start from an existing message log.
    pub fn with_store(config: ServerConfig, store: MessageStore) -> Self {
        Self {
            room: Arc::new(ChatRoom::new(store)),
            config: Arc::new(config),
        }
    }
}

fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    match origins {
        AllowedOrigins::Any => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        AllowedOrigins::List(list) => CorsLayer::new()
            .allow_origin(AllowOrigin::list(list.iter().cloned()))
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true),
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route(HEALTH_PATH, get(health_check))
        .route(MESSAGES_PATH, get(list_messages))
        .route(LIVE_CHANNEL_PATH, get(live_channel))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Message backlog, oldest first. `?limit=` narrows it below the configured
/// history limit.
async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ChatMessage>>, ServerError> {
    let limit = match query.limit {
        Some(0) => {
            return Err(ServerError::BadRequest("limit must be positive".into()));
        }
        Some(n) => n.min(state.config.history_limit),
        None => state.config.history_limit,
    };

    Ok(Json(state.room.store().recent(limit).await))
}

async fn live_channel(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.room))
}

async fn handle_socket(socket: WebSocket, room: Arc<ChatRoom>) {
    if room.is_closing() {
        debug!("Refusing live connection during shutdown");
        return;
    }
    let closed = room.closed();
    tokio::pin!(closed);

    let mut frames = match room.connect() {
        Ok(rx) => rx,
        Err(e) => {
            warn!(error = %e, "Failed to register live connection");
            return;
        }
    };
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = &mut closed => {
                let frame = CloseFrame {
                    code: close_code::AWAY,
                    reason: "server shutting down".into(),
                };
                if sink.send(Message::Close(Some(frame))).await.is_err() {
                    debug!("Live connection already gone at shutdown");
                }
                break;
            }

            frame = frames.recv() => match frame {
                Ok(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        debug!("Live connection write failed");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Live connection lagging, frames dropped");
                }
                Err(RecvError::Closed) => break,
            },

            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = room.post(&text).await {
                        warn!(error = %e, "Failed to broadcast message");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "Live connection read failed");
                    break;
                }
            },
        }
    }

    if let Err(e) = room.disconnect() {
        warn!(error = %e, "Failed to broadcast user count");
    }
}

pub async fn serve<F>(state: AppState, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve_listener(state, listener, shutdown).await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// On shutdown the listener stops accepting and every live connection gets
/// a `1001 Going Away` close frame.
pub async fn serve_listener<F>(
    state: AppState,
    listener: TcpListener,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let room = state.room.clone();
    let app = build_router(state);

    info!(addr = %listener.local_addr()?, "Starting HTTP API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            room.close_all();
        })
        .await?;

    info!("HTTP API server stopped");
    Ok(())
}
