// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// HTTP-facing error codes: the health endpoint and auth middleware, not the
/// envelope-level taxonomy (see [`EnvelopeErrorKind`]), which never becomes
/// an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayError {
    Unauthorized,
    BadRequest,
    Internal,
}

impl RelayError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level HTTP error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Envelope-level error taxonomy. These never surface as HTTP statuses;
/// they are reported to the originating peer as `{"type":"error", ...}`
/// WebSocket frames, or drive session/registry lifecycle with no reply at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeErrorKind {
    /// Frame could not be decoded or is missing a required field.
    Malformed,
    /// `type` is outside the closed set, or the category's addressing rules
    /// all failed to match.
    UnsupportedMessage,
    /// Addressed counterparty (signaling peer) has no active session.
    PeerUnavailable,
    /// Command addressed to an absent device.
    DeviceUnavailable,
    /// Target outbound queue was saturated; the single frame was dropped.
    /// Never sent to a peer — counted only.
    QueueOverflow,
    /// Session idle past the heartbeat deadline. Drives session close, not a reply.
    HeartbeatTimeout,
    /// Underlying transport surfaced an I/O failure. Drives session close, not a reply.
    TransportError,
    /// The same (role, id) re-registered; the prior session was evicted. No reply.
    Superseded,
}

impl EnvelopeErrorKind {
    /// The `kind` string carried in `error` envelopes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::UnsupportedMessage => "unsupported_message",
            Self::PeerUnavailable => "peer_unavailable",
            Self::DeviceUnavailable => "device_unavailable",
            Self::QueueOverflow => "queue_overflow",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::TransportError => "transport_error",
            Self::Superseded => "superseded",
        }
    }

    /// Whether this kind is reported to the originating peer as an `error`
    /// envelope. The remainder drive lifecycle transitions silently.
    pub fn is_reported_to_sender(&self) -> bool {
        matches!(
            self,
            Self::Malformed
                | Self::UnsupportedMessage
                | Self::PeerUnavailable
                | Self::DeviceUnavailable
        )
    }
}

impl fmt::Display for EnvelopeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
