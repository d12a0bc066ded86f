// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Central frame classifier: applies the addressing rules of each message
//! category and enqueues to the resolved target(s).
//!
//! The router performs no I/O — it only reads decoded envelopes and calls
//! [`Session::enqueue`], which is itself non-suspending. It never holds the
//! registry lock across a target enqueue; the target's own queue serializes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::codec::{self, Envelope, FrameType};
use crate::error::EnvelopeErrorKind;
use crate::registry::SessionRegistry;
use crate::session::{EnqueueResult, Role, Session};
use crate::signaling::SignalingTracker;

/// Per-category frame counters for the health probe.
#[derive(Default)]
pub struct RouterMetrics {
    pub heartbeat: AtomicU64,
    pub directory: AtomicU64,
    pub telemetry: AtomicU64,
    pub command: AtomicU64,
    pub signaling: AtomicU64,
    pub unknown: AtomicU64,
    pub queue_overflows: AtomicU64,
}

impl RouterMetrics {
    pub fn snapshot(&self) -> HashMap<&'static str, u64> {
        HashMap::from([
            ("heartbeat", self.heartbeat.load(Ordering::Relaxed)),
            ("directory", self.directory.load(Ordering::Relaxed)),
            ("telemetry", self.telemetry.load(Ordering::Relaxed)),
            ("command", self.command.load(Ordering::Relaxed)),
            ("signaling", self.signaling.load(Ordering::Relaxed)),
            ("unknown", self.unknown.load(Ordering::Relaxed)),
            ("queue_overflow", self.queue_overflows.load(Ordering::Relaxed)),
        ])
    }
}

/// Route one decoded frame originating from `source`.
///
/// `debug_mode` additionally traces the raw envelope value, addressing
/// fields included, before dispatch — off by default since a fleet at scale
/// produces a telemetry frame per device per tick.
pub async fn dispatch(
    registry: &Arc<SessionRegistry>,
    signaling: &Arc<SignalingTracker>,
    metrics: &RouterMetrics,
    source: &Arc<Session>,
    envelope: Envelope,
    debug_mode: bool,
) {
    if debug_mode {
        tracing::debug!(source_id = %source.id, role = ?source.role, frame = %envelope.value, "dispatching frame");
    }

    match envelope.frame_type {
        FrameType::Ping | FrameType::Pong => {
            metrics.heartbeat.fetch_add(1, Ordering::Relaxed);
            route_heartbeat(source, envelope.frame_type);
        }
        FrameType::DevicesList | FrameType::ConnectDevice | FrameType::GetTelemetry => {
            metrics.directory.fetch_add(1, Ordering::Relaxed);
            route_directory(registry, source, &envelope).await;
        }
        FrameType::Telemetry => {
            metrics.telemetry.fetch_add(1, Ordering::Relaxed);
            route_telemetry(registry, metrics, source, &envelope).await;
        }
        FrameType::Command | FrameType::CommandStatus => {
            metrics.command.fetch_add(1, Ordering::Relaxed);
            route_command(registry, source, &envelope).await;
        }
        FrameType::Webrtc => {
            metrics.signaling.fetch_add(1, Ordering::Relaxed);
            route_signaling(registry, signaling, source, &envelope).await;
        }
        FrameType::DeviceConnected | FrameType::ConnectionStatus | FrameType::Error => {
            // Server-originated types; a peer sending one back is nonsensical
            // addressing, handled like any other unrouteable frame.
            metrics.unknown.fetch_add(1, Ordering::Relaxed);
            reject_unsupported(source, &envelope);
        }
    }
}

fn route_heartbeat(source: &Arc<Session>, frame_type: FrameType) {
    match frame_type {
        FrameType::Ping => {
            source.enqueue(&codec::pong());
        }
        FrameType::Pong => {
            source.clear_heartbeat();
        }
        _ => unreachable!(),
    }
}

async fn route_directory(registry: &Arc<SessionRegistry>, source: &Arc<Session>, envelope: &Envelope) {
    if source.role != Role::Client {
        reject_unsupported(source, envelope);
        return;
    }

    match envelope.frame_type {
        FrameType::DevicesList => {
            let devices = registry.list_devices().await;
            source.enqueue(&json!({"type": "devices_list", "devices": devices}));
        }
        FrameType::ConnectDevice => {
            let Some(device_id) = envelope.get_str("deviceId") else {
                reject_malformed(source, "connect_device missing deviceId");
                return;
            };
            let connected = registry.get(Role::Device, device_id).await.is_some();
            let status = if connected { "connected" } else { "disconnected" };
            source.enqueue(&codec::device_connected(device_id, status));
            replay_telemetry(registry, source, device_id).await;
        }
        FrameType::GetTelemetry => {
            let Some(device_id) = envelope.get_str("deviceId") else {
                reject_malformed(source, "get_telemetry missing deviceId");
                return;
            };
            replay_telemetry(registry, source, device_id).await;
        }
        _ => unreachable!(),
    }
}

async fn replay_telemetry(registry: &Arc<SessionRegistry>, sink: &Arc<Session>, device_id: &str) {
    for frame in registry.telemetry.replay(device_id).await {
        sink.enqueue(&frame);
    }
}

async fn route_telemetry(
    registry: &Arc<SessionRegistry>,
    metrics: &RouterMetrics,
    source: &Arc<Session>,
    envelope: &Envelope,
) {
    if source.role != Role::Device {
        reject_unsupported(source, envelope);
        return;
    }

    let stamped = stamp_field(&envelope.value, "deviceId", &source.id);
    registry.telemetry.append(&source.id, stamped.clone()).await;

    for client in registry.snapshot_clients().await {
        if client.enqueue(&stamped) == EnqueueResult::QueueOverflow {
            metrics.queue_overflows.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(client_id = %client.id, device_id = %source.id, "telemetry dropped: queue_overflow");
        }
    }
}

async fn route_command(registry: &Arc<SessionRegistry>, source: &Arc<Session>, envelope: &Envelope) {
    match envelope.frame_type {
        FrameType::Command => {
            if source.role != Role::Client {
                reject_unsupported(source, envelope);
                return;
            }
            let Some(device_id) = envelope.get_str("deviceId") else {
                reject_malformed(source, "command missing deviceId");
                return;
            };
            match registry.get(Role::Device, device_id).await {
                Some(device) => {
                    device.enqueue(&envelope.value);
                }
                None => {
                    source.enqueue(&codec::error(
                        EnvelopeErrorKind::DeviceUnavailable,
                        format!("device '{device_id}' unavailable"),
                    ));
                }
            }
        }
        FrameType::CommandStatus => {
            if source.role != Role::Device {
                reject_unsupported(source, envelope);
                return;
            }
            let Some(command_id) = envelope.get_str("command_id") else {
                reject_malformed(source, "command_status missing command_id");
                return;
            };

            let clients = registry.snapshot_clients().await;
            let client_ids: Vec<&str> = clients.iter().map(|c| c.id.as_str()).collect();
            match resolve_command_status_target(command_id, &client_ids) {
                Some(target_id) => {
                    if let Some(client) = clients.iter().find(|c| c.id == target_id) {
                        client.enqueue(&envelope.value);
                    }
                }
                None => {
                    for client in &clients {
                        client.enqueue(&envelope.value);
                    }
                }
            }
        }
        _ => unreachable!(),
    }
}

/// Resolve which client a `command_status` belongs to by prefix-matching
/// `command_id` against known client ids, falling back to broadcast (`None`)
/// when no client id prefixes it. Pure and independently testable in
/// isolation from session/registry plumbing.
pub fn resolve_command_status_target(command_id: &str, client_ids: &[&str]) -> Option<String> {
    client_ids.iter().find(|id| command_id.starts_with(**id)).map(|id| (*id).to_owned())
}

async fn route_signaling(
    registry: &Arc<SessionRegistry>,
    signaling: &Arc<SignalingTracker>,
    source: &Arc<Session>,
    envelope: &Envelope,
) {
    let Some(subtype) = envelope.subtype() else {
        reject_malformed(source, "webrtc missing subtype");
        return;
    };

    match subtype {
        "offer" => route_offer(registry, signaling, source, envelope).await,
        "answer" => route_answer(registry, source, envelope).await,
        "ice_candidate" => route_bidirectional(registry, signaling, source, envelope, false).await,
        "close" | "error" => route_bidirectional(registry, signaling, source, envelope, true).await,
        _ => reject_unsupported(source, envelope),
    }
}

async fn route_offer(
    registry: &Arc<SessionRegistry>,
    signaling: &Arc<SignalingTracker>,
    source: &Arc<Session>,
    envelope: &Envelope,
) {
    if source.role != Role::Client {
        reject_unsupported(source, envelope);
        return;
    }
    let Some(device_id) = envelope.get_str("deviceId") else {
        reject_malformed(source, "webrtc offer missing deviceId");
        return;
    };

    match registry.get(Role::Device, device_id).await {
        Some(device) => {
            let token = envelope.get_str("token").map(str::to_owned);
            signaling.open(&source.id, device_id, token).await;
            let stamped = stamp_field(&envelope.value, "clientId", &source.id);
            device.enqueue(&stamped);
        }
        None => {
            source.enqueue(&codec::error(
                EnvelopeErrorKind::PeerUnavailable,
                format!("device '{device_id}' unavailable"),
            ));
        }
    }
}

async fn route_answer(registry: &Arc<SessionRegistry>, source: &Arc<Session>, envelope: &Envelope) {
    if source.role != Role::Device {
        reject_unsupported(source, envelope);
        return;
    }
    let Some(client_id) = envelope.get_str("clientId") else {
        reject_malformed(source, "webrtc answer missing clientId");
        return;
    };

    match registry.get(Role::Client, client_id).await {
        Some(client) => {
            let stamped = stamp_field(&envelope.value, "deviceId", &source.id);
            client.enqueue(&stamped);
        }
        None => {
            source.enqueue(&codec::error(
                EnvelopeErrorKind::PeerUnavailable,
                format!("client '{client_id}' unavailable"),
            ));
        }
    }
}

/// `ice_candidate`, `close`, and `error` share the same bidirectional
/// addressing: by `deviceId` when the source is a client, by `clientId` when
/// the source is a device. `ends_session` additionally closes the tracked
/// signaling session for the pair (used for `close`/`error`).
async fn route_bidirectional(
    registry: &Arc<SessionRegistry>,
    signaling: &Arc<SignalingTracker>,
    source: &Arc<Session>,
    envelope: &Envelope,
    ends_session: bool,
) {
    match source.role {
        Role::Client => {
            let Some(device_id) = envelope.get_str("deviceId") else {
                reject_malformed(source, "webrtc message missing deviceId");
                return;
            };
            if ends_session {
                signaling.close(&source.id, device_id).await;
            } else if !signaling.touch(&source.id, device_id).await {
                tracing::debug!(client_id = %source.id, device_id = %device_id, "signaling message for untracked negotiation");
            }
            match registry.get(Role::Device, device_id).await {
                Some(device) => {
                    let stamped = stamp_field(&envelope.value, "clientId", &source.id);
                    device.enqueue(&stamped);
                }
                None => {
                    source.enqueue(&codec::error(
                        EnvelopeErrorKind::PeerUnavailable,
                        format!("device '{device_id}' unavailable"),
                    ));
                }
            }
        }
        Role::Device => {
            let Some(client_id) = envelope.get_str("clientId") else {
                reject_malformed(source, "webrtc message missing clientId");
                return;
            };
            if ends_session {
                signaling.close(client_id, &source.id).await;
            } else if !signaling.touch(client_id, &source.id).await {
                tracing::debug!(client_id = %client_id, device_id = %source.id, "signaling message for untracked negotiation");
            }
            match registry.get(Role::Client, client_id).await {
                Some(client) => {
                    let stamped = stamp_field(&envelope.value, "deviceId", &source.id);
                    client.enqueue(&stamped);
                }
                None => {
                    source.enqueue(&codec::error(
                        EnvelopeErrorKind::PeerUnavailable,
                        format!("client '{client_id}' unavailable"),
                    ));
                }
            }
        }
    }
}

fn reject_malformed(source: &Arc<Session>, message: &str) {
    source.enqueue(&codec::error(EnvelopeErrorKind::Malformed, message));
}

fn reject_unsupported(source: &Arc<Session>, envelope: &Envelope) {
    tracing::debug!(source_id = %source.id, frame_type = ?envelope.frame_type, "dropping unroutable frame");
    source.enqueue(&codec::error(
        EnvelopeErrorKind::UnsupportedMessage,
        "message type not supported for this session role",
    ));
}

/// Clone a JSON object, inserting/overwriting one addressing field. Used to
/// stamp `deviceId`/`clientId` onto frames as they cross the router —
/// payload fields (sdp, data, ...) are left untouched.
fn stamp_field(value: &Value, key: &str, val: &str) -> Value {
    let mut cloned = value.clone();
    if let Some(obj) = cloned.as_object_mut() {
        obj.insert(key.to_owned(), Value::String(val.to_owned()));
    }
    cloned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionMetadata;
    use serde_json::json;

    fn new_session(id: &str, role: Role) -> Arc<Session> {
        let (session, _rx) = Session::new(id.to_owned(), role, SessionMetadata::default(), 8);
        session.activate();
        session
    }

    #[test]
    fn command_status_prefix_matches_known_client() {
        let ids = vec!["c1", "c2"];
        assert_eq!(resolve_command_status_target("c1-42-stop", &ids), Some("c1".to_owned()));
        assert_eq!(resolve_command_status_target("ghost-1", &ids), None);
    }

    #[test]
    fn stamp_field_preserves_other_fields() {
        let value = json!({"type": "telemetry", "seq": 1});
        let stamped = stamp_field(&value, "deviceId", "alpha");
        assert_eq!(stamped["seq"], 1);
        assert_eq!(stamped["deviceId"], "alpha");
    }

    #[tokio::test]
    async fn ping_replies_with_pong_to_source_only() {
        let registry = Arc::new(SessionRegistry::new(10));
        let signaling = Arc::new(SignalingTracker::new());
        let metrics = RouterMetrics::default();
        let device = new_session("alpha", Role::Device);

        let envelope = codec::decode(r#"{"type":"ping"}"#).unwrap();
        dispatch(&registry, &signaling, &metrics, &device, envelope, false).await;

        assert_eq!(metrics.snapshot()["heartbeat"], 1);
    }

    #[tokio::test]
    async fn command_to_absent_device_reports_device_unavailable() {
        let registry = Arc::new(SessionRegistry::new(10));
        let signaling = Arc::new(SignalingTracker::new());
        let metrics = RouterMetrics::default();
        let client = new_session("c1", Role::Client);

        let envelope = codec::decode(
            r#"{"type":"command","deviceId":"ghost","command":"stop","command_id":"c1-1-T"}"#,
        )
        .unwrap();
        dispatch(&registry, &signaling, &metrics, &client, envelope, false).await;

        assert_eq!(metrics.snapshot()["command"], 1);
    }

    #[tokio::test]
    async fn telemetry_from_client_is_rejected() {
        let registry = Arc::new(SessionRegistry::new(10));
        let signaling = Arc::new(SignalingTracker::new());
        let metrics = RouterMetrics::default();
        let client = new_session("c1", Role::Client);

        let envelope = codec::decode(r#"{"type":"telemetry","seq":1}"#).unwrap();
        dispatch(&registry, &signaling, &metrics, &client, envelope, false).await;

        assert_eq!(registry.telemetry.depth("c1").await, 0);
    }
}
