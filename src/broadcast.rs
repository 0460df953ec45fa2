//! Fan-out broadcast sink
//!
//! Central registry distributing normalized telemetry messages from device
//! connections to every currently-registered dashboard subscriber. Delivery
//! is best-effort and fire-and-forget: there is no queueing, no replay, and
//! a dead subscriber never blocks the rest of a broadcast.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::telemetry::TelemetryMessage;

/// A registered dashboard subscriber, handed out by [`BroadcastSink::register`]
///
/// The owning connection task drains `receiver`; dropping it is enough to
/// make subsequent deliveries fail fast, but `deregister` should still be
/// called so the sink releases the registry slot.
pub struct Subscription {
    /// Identity of this subscriber within the sink registry
    pub id: Uuid,
    /// Channel carrying broadcast messages to the subscriber's connection
    pub receiver: mpsc::UnboundedReceiver<TelemetryMessage>,
}

/// Statistics about broadcast activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkStats {
    /// Number of broadcast calls processed
    pub messages_broadcast: u64,
    /// Number of successful per-subscriber deliveries
    pub deliveries: u64,
    /// Number of deliveries skipped because the subscriber was gone
    pub delivery_failures: u64,
    /// Count of broadcast messages by device id
    pub device_counts: HashMap<String, u64>,
}

/// Registry of active subscribers with atomic fan-out delivery
///
/// Register and deregister are driven by the dashboard listener's
/// connect/disconnect events; broadcast is driven by device connection
/// tasks. All three may run concurrently from different tasks.
pub struct BroadcastSink {
    /// Active subscribers, keyed by subscription id
    subscribers: Mutex<HashMap<Uuid, mpsc::UnboundedSender<TelemetryMessage>>>,
    /// Statistics about broadcast activity
    stats: RwLock<SinkStats>,
}

impl BroadcastSink {
    /// Create a new sink with no subscribers
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            stats: RwLock::new(SinkStats::default()),
        }
    }

    /// Register a new subscriber and return its subscription handle
    pub async fn register(&self) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.subscribers.lock().await.insert(id, sender);
        debug!(subscriber = %id, "Subscriber registered");
        Subscription { id, receiver }
    }

    /// Remove a subscriber from the active set
    ///
    /// Safe to call for an id that was already removed; that is a no-op.
    pub async fn deregister(&self, id: Uuid) {
        if self.subscribers.lock().await.remove(&id).is_some() {
            debug!(subscriber = %id, "Subscriber deregistered");
        }
    }

    /// Deliver a message to every subscriber currently in the active set
    ///
    /// One atomic pass over the snapshot of subscribers at call time. A
    /// failed delivery (subscriber dropped its receiver mid-broadcast) is
    /// skipped and counted, never surfaced to the caller; the subscriber is
    /// removed later by its own disconnect event. Returns the number of
    /// subscribers the message was delivered to.
    pub async fn broadcast(&self, message: TelemetryMessage) -> usize {
        let device_id = message
            .device_id()
            .unwrap_or("unknown")
            .to_string();

        let mut delivered = 0usize;
        let mut failed = 0usize;
        {
            let subscribers = self.subscribers.lock().await;
            for (id, sender) in subscribers.iter() {
                if sender.send(message.clone()).is_ok() {
                    delivered += 1;
                } else {
                    failed += 1;
                    warn!(
                        subscriber = %id,
                        device = %device_id,
                        "Subscriber gone mid-broadcast, skipping delivery"
                    );
                }
            }
        }

        let mut stats = self.stats.write().await;
        stats.messages_broadcast += 1;
        stats.deliveries += delivered as u64;
        stats.delivery_failures += failed as u64;
        *stats.device_counts.entry(device_id.clone()).or_insert(0) += 1;
        drop(stats);

        trace!(
            device = %device_id,
            delivered,
            failed,
            "Broadcast pass complete"
        );
        delivered
    }

    /// Get the current number of registered subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Get current broadcast statistics
    pub async fn stats(&self) -> SinkStats {
        self.stats.read().await.clone()
    }

    /// Reset all statistics counters
    pub async fn reset_stats(&self) {
        *self.stats.write().await = SinkStats::default();
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}
