//! Telemetry message parsing and normalization
//!
//! Devices send schema-less JSON objects. The only field the bridge cares
//! about is `device_id`; when a device omits it, the connection's remote
//! host stands in for it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{self, BridgeResult};

/// Key identifying the originating device inside a telemetry payload
pub const DEVICE_ID_KEY: &str = "device_id";

/// One normalized reading from one device
///
/// A thin wrapper over a JSON object. Every field other than `device_id`
/// is opaque and passed through to subscribers unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelemetryMessage(Map<String, Value>);

impl TelemetryMessage {
    /// Get the device identifier, if it is a string
    pub fn device_id(&self) -> Option<&str> {
        self.0.get(DEVICE_ID_KEY).and_then(Value::as_str)
    }

    /// Get an arbitrary field of the payload
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Borrow the underlying field map
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the message, returning the underlying field map
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl From<TelemetryMessage> for Value {
    fn from(message: TelemetryMessage) -> Self {
        Value::Object(message.0)
    }
}

/// Normalize a parsed JSON value into a [`TelemetryMessage`]
///
/// Pure function: no network dependency. Non-object values are rejected.
/// Objects lacking `device_id` gain one set to `remote_host`; objects that
/// already carry the key pass through verbatim, whatever its value.
pub fn normalize(raw: Value, remote_host: &str) -> BridgeResult<TelemetryMessage> {
    match raw {
        Value::Object(mut fields) => {
            if !fields.contains_key(DEVICE_ID_KEY) {
                fields.insert(
                    DEVICE_ID_KEY.to_string(),
                    Value::String(remote_host.to_string()),
                );
            }
            Ok(TelemetryMessage(fields))
        }
        other => Err(error::frame_not_object(&other)),
    }
}

/// Parse one raw text frame from a device into a normalized message
pub fn parse_frame(frame: &str, remote_host: &str) -> BridgeResult<TelemetryMessage> {
    let raw: Value = serde_json::from_str(frame).map_err(error::frame_invalid)?;
    normalize(raw, remote_host)
}
