//! Device-facing WebSocket listener
//!
//! Accepts long-lived connections from telemetry devices, reads text frames,
//! normalizes each one and forwards it to the broadcast sink. Each accepted
//! connection runs in its own task so a slow or misbehaving device cannot
//! block the others.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::broadcast::BroadcastSink;
use crate::config::DeviceConfig;
use crate::error::{self, BridgeResult};
use crate::telemetry;

/// WebSocket server accepting telemetry device connections
pub struct DeviceListener {
    /// Endpoint configuration
    config: DeviceConfig,
    /// Sink receiving every normalized message
    sink: Arc<BroadcastSink>,
    /// Active connections counter
    connections: Arc<AtomicUsize>,
}

impl DeviceListener {
    /// Create a new device listener
    pub fn new(config: DeviceConfig, sink: Arc<BroadcastSink>) -> Self {
        Self {
            config,
            sink,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get the number of active device connections
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Bind the device endpoint and start accepting connections
    ///
    /// The bind happens here, before the accept loop detaches, so a port
    /// already in use aborts startup instead of being swallowed by a
    /// background task. Returns the bound address and the accept loop's
    /// task handle.
    pub async fn start(&self) -> BridgeResult<(SocketAddr, JoinHandle<()>)> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| error::device_bind_failed(&addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| error::device_bind_failed(&addr, e))?;

        info!(addr = %local_addr, "Device listener accepting connections");

        let sink = self.sink.clone();
        let connections = self.connections.clone();

        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        connections.fetch_add(1, Ordering::SeqCst);
                        info!(
                            device = %peer,
                            connections = connections.load(Ordering::SeqCst),
                            "Device connected"
                        );

                        let sink = sink.clone();
                        let counter = Arc::clone(&connections);
                        tokio::spawn(async move {
                            if let Err(e) = handle_device(stream, peer, sink).await {
                                warn!(device = %peer, error = %e, "Device connection ended with error");
                            }
                            counter.fetch_sub(1, Ordering::SeqCst);
                            info!(
                                device = %peer,
                                connections = counter.load(Ordering::SeqCst),
                                "Device disconnected"
                            );
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept device connection");
                    }
                }
            }
        });

        Ok((local_addr, handle))
    }
}

/// Serve one device connection until it closes or errors
///
/// A malformed frame is logged and discarded; the read loop continues. Any
/// connection-level error ends the loop without affecting other devices.
async fn handle_device(
    stream: TcpStream,
    peer: SocketAddr,
    sink: Arc<BroadcastSink>,
) -> BridgeResult<()> {
    let mut ws_stream = accept_async(stream)
        .await
        .map_err(error::websocket_accept_failed)?;

    // Host portion only; this doubles as the fallback device_id
    let device_host = peer.ip().to_string();

    while let Some(frame) = ws_stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                match telemetry::parse_frame(text.as_str(), &device_host) {
                    Ok(message) => {
                        let delivered = sink.broadcast(message).await;
                        debug!(
                            device = %peer,
                            delivered,
                            "Telemetry frame forwarded to subscribers"
                        );
                    }
                    Err(e) => {
                        warn!(device = %peer, error = %e, "Discarding invalid telemetry frame");
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                if ws_stream.send(Message::Pong(payload)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!(device = %peer, "Device requested close");
                break;
            }
            Ok(_) => {
                debug!(device = %peer, "Ignoring non-text frame from device");
            }
            Err(e) => {
                debug!(device = %peer, error = %e, "Device connection error");
                break;
            }
        }
    }

    Ok(())
}
