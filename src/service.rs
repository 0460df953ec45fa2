//! Bridge supervisor
//!
//! Composes the two listeners around one shared broadcast sink. Owns no
//! business logic: the device listener runs in its own task, the dashboard
//! listener runs in the calling context, and the process runs until
//! externally terminated.

use std::sync::Arc;
use tracing::info;

use crate::broadcast::BroadcastSink;
use crate::config::Config;
use crate::dashboard::DashboardListener;
use crate::device::DeviceListener;
use crate::error::{self, BridgeResult};

/// Supervisor composing the device and dashboard listeners
pub struct BridgeService {
    config: Config,
    sink: Arc<BroadcastSink>,
}

impl BridgeService {
    /// Create a new bridge service with an empty sink
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sink: Arc::new(BroadcastSink::new()),
        }
    }

    /// Get a handle to the shared broadcast sink
    pub fn sink(&self) -> Arc<BroadcastSink> {
        self.sink.clone()
    }

    /// Bring up both listeners and run until one of them fails
    ///
    /// Both binds happen before anything detaches, so an unavailable port
    /// surfaces here and aborts startup. The device accept loop normally
    /// never returns; if it does, that is reported instead of letting the
    /// dashboard side run on silently.
    pub async fn run(self) -> BridgeResult<()> {
        let device = DeviceListener::new(self.config.device.clone(), self.sink.clone());
        let (device_addr, device_handle) = device.start().await?;
        info!(addr = %device_addr, "Device listener started");

        let dashboard = DashboardListener::new(self.config.dashboard.clone(), self.sink.clone());

        tokio::select! {
            result = dashboard.serve() => result,
            _ = device_handle => Err(error::listener_stopped("Device listener")),
        }
    }
}
