//! WebSocket broadcast server
//!
//! Every published position is formatted once and queued for each connected subscriber.
//! Each connection runs a sender loop (queue to socket) and a receiver loop (drains client
//! frames to detect disconnects); whichever ends first tears the subscriber down.

use super::subscribers::{OverflowPolicy, QueueRx, Registry};
use super::{PositionPublisher, PublishError, format};
use crate::Position;
use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Settings of the broadcast server
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Listen address, `host:port`; port 0 picks a free port
    pub address: String,
    /// WebSocket route
    pub path: String,
    /// Per-subscriber queue capacity, at least 1
    pub buffer: usize,
    pub overflow: OverflowPolicy,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            path: "/ws".to_string(),
            buffer: 16,
            overflow: OverflowPolicy::default(),
        }
    }
}

#[derive(Clone)]
struct ServerState {
    registry: Arc<Registry>,
    cancel: CancellationToken,
}

/// Publisher that broadcasts positions to WebSocket subscribers
pub struct FanoutPublisher {
    registry: Arc<Registry>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    server: Option<JoinHandle<()>>,
}

impl FanoutPublisher {
    /// Bind the listener and start serving
    ///
    /// The server, and every subscriber connection, stops when `cancel` is cancelled or the
    /// publisher is closed or dropped.
    pub async fn bind(config: FanoutConfig, cancel: CancellationToken) -> Result<Self, PublishError> {
        let listener = TcpListener::bind(&config.address)
            .await
            .map_err(|source| PublishError::Bind {
                address: config.address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let cancel = cancel.child_token();
        let registry = Arc::new(Registry::new(config.buffer, config.overflow));
        let state = ServerState {
            registry: registry.clone(),
            cancel: cancel.clone(),
        };

        let route = if config.path.starts_with('/') {
            config.path.clone()
        } else {
            format!("/{}", config.path)
        };
        let app = Router::new()
            .route(&route, get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(state);

        tracing::info!(
            address = %local_addr,
            path = %route,
            buffer = config.buffer.max(1),
            overflow = ?config.overflow,
            "Broadcast server listening"
        );
        let server = tokio::spawn(serve(listener, app, cancel.clone()));

        Ok(Self {
            registry,
            local_addr,
            cancel,
            server: Some(server),
        })
    }

    /// The bound address, useful when binding port 0
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    fn server_running(&self) -> bool {
        self.server.as_ref().is_some_and(|server| !server.is_finished())
    }
}

impl Drop for FanoutPublisher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl PositionPublisher for FanoutPublisher {
    async fn publish(&mut self, position: &Position) -> Result<(), PublishError> {
        if !self.server_running() {
            return Err(PublishError::ServerStopped);
        }
        if self.registry.is_empty() {
            return Ok(());
        }

        let message: Arc<str> = format::geojson_string(position)?.into();
        let delivered = self.registry.broadcast(message).await;
        tracing::trace!(device = %position.device_id(), delivered, "Broadcast position");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PublishError> {
        self.cancel.cancel();
        self.registry.clear();
        if let Some(server) = self.server.take() {
            if let Err(e) = server.await {
                tracing::warn!(error = %e, "Broadcast server task failed");
            }
        }
        Ok(())
    }
}

async fn serve(listener: TcpListener, app: Router, cancel: CancellationToken) {
    let shutdown = cancel.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
    if let Err(e) = result {
        tracing::error!(error = %e, "Broadcast server failed");
    }
    // Subscribers never outlive the server
    cancel.cancel();
    tracing::info!("Broadcast server stopped");
}

async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "subscribers": state.registry.len(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_subscriber(socket, state))
}

async fn handle_subscriber(socket: WebSocket, state: ServerState) {
    let (id, queue, token) = state.registry.register(&state.cancel);
    tracing::info!(subscriber = id, "Subscriber connected");

    let (sender, receiver) = socket.split();
    let mut send_task = tokio::spawn(send_loop(id, sender, queue, token.clone()));
    let mut recv_task = tokio::spawn(recv_loop(id, receiver, token.clone()));

    tokio::select! {
        _ = &mut send_task => {}
        _ = &mut recv_task => {}
    }

    // Stops whichever loop is still running; the sender closes the socket on its way out
    token.cancel();
    state.registry.unregister(id);
    tracing::info!(subscriber = id, "Subscriber disconnected");
}

async fn send_loop(
    id: u64,
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
    mut queue: QueueRx,
    token: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = token.cancelled() => break,
            message = queue.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        if let Err(e) = sender.send(Message::Text(message.to_string().into())).await {
            tracing::debug!(subscriber = id, error = %e, "WebSocket send failed");
            token.cancel();
            return;
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    let _ = sender.close().await;
}

async fn recv_loop(
    id: u64,
    mut receiver: futures::stream::SplitStream<WebSocket>,
    token: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => break,
            frame = receiver.next() => frame,
        };

        match frame {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                tracing::debug!(subscriber = id, error = %e, "WebSocket receive failed");
                break;
            }
            // Client frames carry nothing we act on
            Some(Ok(_)) => {}
        }
    }
}
