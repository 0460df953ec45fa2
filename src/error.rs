use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Structured error type for the telemetry bridge
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct BridgeError {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional context for additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Severity level
    pub severity: ErrorSeverity,
    /// Error category for handling strategies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
}

/// Type alias for bridge results
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Error codes for different types of errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // General errors
    Unknown,
    ConfigInvalid,

    // Device listener errors
    DeviceBindFailed,
    WebSocketAcceptFailed,
    FrameInvalid,
    FrameNotObject,

    // Dashboard listener errors
    DashboardBindFailed,
    DashboardServeFailed,

    // Supervisor errors
    ListenerStopped,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code_str = match self {
            ErrorCode::Unknown => "UNKNOWN",
            ErrorCode::ConfigInvalid => "CONFIG_INVALID",
            ErrorCode::DeviceBindFailed => "DEVICE_BIND_FAILED",
            ErrorCode::WebSocketAcceptFailed => "WS_ACCEPT_FAILED",
            ErrorCode::FrameInvalid => "FRAME_INVALID",
            ErrorCode::FrameNotObject => "FRAME_NOT_OBJECT",
            ErrorCode::DashboardBindFailed => "DASHBOARD_BIND_FAILED",
            ErrorCode::DashboardServeFailed => "DASHBOARD_SERVE_FAILED",
            ErrorCode::ListenerStopped => "LISTENER_STOPPED",
        };
        write!(f, "{}", code_str)
    }
}

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Informational only, not an actual error
    Info,
    /// Warning that doesn't prevent operation
    Warning,
    /// Error that affects functionality but allows continued operation
    Error,
    /// Severe error that prevents further operation
    Critical,
}

/// Error category for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Network-related errors (bind, accept, connection loss)
    Network,
    /// Malformed data received from a device
    Protocol,
    /// Configuration-related errors
    Configuration,
    /// Internal errors
    Internal,
}

// Helper functions to create standard errors

/// Create a config invalid error
pub fn config_invalid(error: impl fmt::Display) -> BridgeError {
    BridgeError {
        code: ErrorCode::ConfigInvalid,
        message: "Invalid bridge configuration".to_string(),
        context: Some(error.to_string()),
        severity: ErrorSeverity::Critical,
        category: Some(ErrorCategory::Configuration),
    }
}

/// Create a device endpoint bind failed error
pub fn device_bind_failed(addr: &str, error: std::io::Error) -> BridgeError {
    BridgeError {
        code: ErrorCode::DeviceBindFailed,
        message: format!("Failed to bind device listener to {}", addr),
        context: Some(error.to_string()),
        severity: ErrorSeverity::Critical,
        category: Some(ErrorCategory::Network),
    }
}

/// Create a dashboard endpoint bind failed error
pub fn dashboard_bind_failed(addr: &str, error: std::io::Error) -> BridgeError {
    BridgeError {
        code: ErrorCode::DashboardBindFailed,
        message: format!("Failed to bind dashboard listener to {}", addr),
        context: Some(error.to_string()),
        severity: ErrorSeverity::Critical,
        category: Some(ErrorCategory::Network),
    }
}

/// Create a dashboard serve failed error
pub fn dashboard_serve_failed(error: std::io::Error) -> BridgeError {
    BridgeError {
        code: ErrorCode::DashboardServeFailed,
        message: "Dashboard listener stopped serving".to_string(),
        context: Some(error.to_string()),
        severity: ErrorSeverity::Critical,
        category: Some(ErrorCategory::Network),
    }
}

/// Create a WebSocket accept failed error
pub fn websocket_accept_failed(error: impl std::error::Error) -> BridgeError {
    BridgeError {
        code: ErrorCode::WebSocketAcceptFailed,
        message: "WebSocket handshake failed".to_string(),
        context: Some(error.to_string()),
        severity: ErrorSeverity::Warning,
        category: Some(ErrorCategory::Network),
    }
}

/// Create a frame invalid error for frames that are not valid JSON
pub fn frame_invalid(error: serde_json::Error) -> BridgeError {
    BridgeError {
        code: ErrorCode::FrameInvalid,
        message: "Telemetry frame is not valid JSON".to_string(),
        context: Some(error.to_string()),
        severity: ErrorSeverity::Warning,
        category: Some(ErrorCategory::Protocol),
    }
}

/// Create a frame not object error for valid JSON that is not an object
pub fn frame_not_object(raw: &serde_json::Value) -> BridgeError {
    let kind = match raw {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    };
    BridgeError {
        code: ErrorCode::FrameNotObject,
        message: "Telemetry frame is not a JSON object".to_string(),
        context: Some(format!("got {}", kind)),
        severity: ErrorSeverity::Warning,
        category: Some(ErrorCategory::Protocol),
    }
}

/// Create a listener stopped error
pub fn listener_stopped(name: &str) -> BridgeError {
    BridgeError {
        code: ErrorCode::ListenerStopped,
        message: format!("{} stopped unexpectedly", name),
        context: None,
        severity: ErrorSeverity::Critical,
        category: Some(ErrorCategory::Internal),
    }
}
