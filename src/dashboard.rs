//! Dashboard-facing listener
//!
//! Serves browser dashboard clients: a fixed liveness response on `GET /`
//! and a WebSocket upgrade on `GET /ws`. Each upgraded socket is registered
//! with the broadcast sink and receives every subsequent broadcast as an
//! `update_dashboard` frame; subscribers are receive-only, so inbound
//! frames other than close are ignored.

use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::broadcast::BroadcastSink;
use crate::config::DashboardConfig;
use crate::error::{self, BridgeResult};
use crate::telemetry::TelemetryMessage;

/// Event name carried by every broadcast frame
pub const UPDATE_DASHBOARD_EVENT: &str = "update_dashboard";

/// Fixed response confirming the service is running
pub const LIVENESS_BANNER: &str = "telebridge dashboard server is running";

/// One server-to-client frame on the dashboard WebSocket
#[derive(Debug, Serialize)]
pub struct DashboardFrame {
    /// Event name, always [`UPDATE_DASHBOARD_EVENT`] for broadcasts
    pub event: &'static str,
    /// The normalized telemetry message
    pub data: TelemetryMessage,
    /// When the frame was emitted
    pub timestamp: DateTime<Utc>,
}

impl DashboardFrame {
    /// Wrap a telemetry message in an `update_dashboard` frame
    pub fn update(data: TelemetryMessage) -> Self {
        Self {
            event: UPDATE_DASHBOARD_EVENT,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// HTTP/WebSocket server front end for dashboard subscribers
pub struct DashboardListener {
    /// Endpoint configuration
    config: DashboardConfig,
    /// Sink subscribers are registered with
    sink: Arc<BroadcastSink>,
}

impl DashboardListener {
    /// Create a new dashboard listener
    pub fn new(config: DashboardConfig, sink: Arc<BroadcastSink>) -> Self {
        Self { config, sink }
    }

    /// Bind the dashboard endpoint and serve it in the calling task
    ///
    /// A bind failure is fatal and returned to the caller before any work
    /// detaches.
    pub async fn serve(self) -> BridgeResult<()> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| error::dashboard_bind_failed(&addr, e))?;
        self.serve_on(listener).await
    }

    /// Serve dashboard clients on an already-bound listener
    pub async fn serve_on(self, listener: TcpListener) -> BridgeResult<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "Dashboard listener accepting connections");
        }

        let router = router(self.sink);
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(error::dashboard_serve_failed)
    }
}

/// Build the dashboard router around a shared sink
pub fn router(sink: Arc<BroadcastSink>) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/ws", get(ws_handler))
        .with_state(sink)
        .layer(TraceLayer::new_for_http())
}

/// Liveness check handler
async fn liveness() -> &'static str {
    LIVENESS_BANNER
}

/// Upgrade an incoming connection to a subscriber WebSocket
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(sink): State<Arc<BroadcastSink>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_subscriber(socket, addr, sink))
}

/// Serve one dashboard subscriber until it disconnects
async fn handle_subscriber(socket: WebSocket, addr: SocketAddr, sink: Arc<BroadcastSink>) {
    let mut subscription = sink.register().await;
    info!(subscriber = %subscription.id, client = %addr, "Dashboard client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    loop {
        tokio::select! {
            // Deliver broadcast messages to this subscriber
            update = subscription.receiver.recv() => {
                match update {
                    Some(message) => {
                        let frame = DashboardFrame::update(message);
                        let json = match serde_json::to_string(&frame) {
                            Ok(json) => json,
                            Err(e) => {
                                error!(
                                    subscriber = %subscription.id,
                                    error = %e,
                                    "Error serializing dashboard frame"
                                );
                                continue;
                            }
                        };
                        if ws_sender.send(Message::Text(json)).await.is_err() {
                            // Connection already dead; disconnect path cleans up
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Watch for the subscriber leaving; inbound payloads are ignored
            inbound = ws_receiver.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(subscriber = %subscription.id, "Dashboard client closed connection");
                        break;
                    }
                    Some(Ok(_)) => {
                        debug!(subscriber = %subscription.id, "Ignoring inbound dashboard frame");
                    }
                    Some(Err(e)) => {
                        debug!(subscriber = %subscription.id, error = %e, "Dashboard connection error");
                        break;
                    }
                }
            }
        }
    }

    sink.deregister(subscription.id).await;
    info!(subscriber = %subscription.id, client = %addr, "Dashboard client disconnected");
}
