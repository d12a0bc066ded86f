// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame envelope decode/encode and the closed `type` set.
//!
//! Category-specific bodies (telemetry data, command payloads, SDP blobs) are
//! opaque to the codec and the router alike: a decoded [`Envelope`] keeps the
//! original JSON object around and addressing fields are read out of it with
//! `.get(...)`, the same way the rest of the payload passes through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::EnvelopeErrorKind;

/// The closed set of `type` discriminators accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Ping,
    Pong,
    DevicesList,
    ConnectDevice,
    GetTelemetry,
    DeviceConnected,
    ConnectionStatus,
    Telemetry,
    Command,
    CommandStatus,
    Webrtc,
    Error,
}

impl FrameType {
    fn from_wire(s: &str) -> Option<Self> {
        serde_json::from_value(Value::String(s.to_owned())).ok()
    }
}

/// A decoded inbound message: its discriminator and the full original JSON
/// object, so the router can pull addressing fields while leaving payload
/// fields (sdp, data, ...) untouched.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub frame_type: FrameType,
    pub value: Value,
}

impl Envelope {
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.value.get(field).and_then(Value::as_str)
    }

    pub fn subtype(&self) -> Option<&str> {
        self.get_str("subtype")
    }
}

/// Decode raw inbound text as a frame envelope.
///
/// Rejects messages that fail to parse as a JSON object, lack `type`, or
/// declare a `type` outside the closed set in all three cases with
/// [`EnvelopeErrorKind::Malformed`] — an unrecognized `type` is a malformed
/// frame at the codec boundary, not an `unsupported_message` (that kind is
/// reserved for frames whose `type` is valid but whose routing rules all miss).
pub fn decode(text: &str) -> Result<Envelope, EnvelopeErrorKind> {
    let value: Value = serde_json::from_str(text).map_err(|_| EnvelopeErrorKind::Malformed)?;
    if !value.is_object() {
        return Err(EnvelopeErrorKind::Malformed);
    }
    let type_str = value.get("type").and_then(Value::as_str).ok_or(EnvelopeErrorKind::Malformed)?;
    let frame_type = FrameType::from_wire(type_str).ok_or(EnvelopeErrorKind::Malformed)?;
    Ok(Envelope { frame_type, value })
}

/// Encode a JSON value as outbound wire text.
pub fn encode(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| json!({"type": "error", "kind": "internal"}).to_string())
}

// -- Outbound envelope builders ------------------------------------------------

pub fn pong() -> Value {
    json!({"type": "pong"})
}

pub fn ping() -> Value {
    json!({"type": "ping"})
}

pub fn device_connected(device_id: &str, status: &str) -> Value {
    json!({"type": "device_connected", "deviceId": device_id, "status": status})
}

pub fn connection_status(device_id: &str, status: &str) -> Value {
    json!({"type": "connection_status", "deviceId": device_id, "status": status})
}

pub fn error(kind: EnvelopeErrorKind, message: impl Into<String>) -> Value {
    json!({"type": "error", "kind": kind.as_str(), "message": message.into()})
}
