pub mod broadcast;
pub mod config;
pub mod dashboard;
pub mod device;
pub mod error;
pub mod service;
pub mod telemetry;

// Re-export core components
pub use crate::broadcast::{BroadcastSink, SinkStats, Subscription};
pub use crate::config::Config;
pub use crate::dashboard::DashboardListener;
pub use crate::device::DeviceListener;
pub use crate::error::{BridgeError, BridgeResult};
pub use crate::service::BridgeService;
pub use crate::telemetry::{normalize, parse_frame, TelemetryMessage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
