// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Name→session directory for devices and clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::codec;
use crate::session::{Role, Session, SessionMetadata};
use crate::telemetry::TelemetryBuffer;

/// Directory snapshot entry for `devices_list`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub device_type: Option<String>,
    pub connected: bool,
}

/// Metadata retained for a device across brief disconnects, so the directory
/// keeps showing its name/type while its telemetry ring is still within the
/// retention window. Removed together with the ring by the sweep.
struct KnownDevice {
    name: Option<String>,
    device_type: Option<String>,
}

/// Session registry: disjoint device/client maps, plus the telemetry buffer
/// the registry owns and outlives any single device session.
pub struct SessionRegistry {
    devices: RwLock<HashMap<String, Arc<Session>>>,
    clients: RwLock<HashMap<String, Arc<Session>>>,
    known_devices: RwLock<HashMap<String, KnownDevice>>,
    pub telemetry: TelemetryBuffer,
}

impl SessionRegistry {
    pub fn new(telemetry_capacity: usize) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
            known_devices: RwLock::new(HashMap::new()),
            telemetry: TelemetryBuffer::new(telemetry_capacity),
        }
    }

    fn map_for(&self, role: Role) -> &RwLock<HashMap<String, Arc<Session>>> {
        match role {
            Role::Device => &self.devices,
            Role::Client => &self.clients,
        }
    }

    /// Register a session, evicting (closing with reason "superseded") any
    /// prior session with the same (role, id) first. Last-writer-wins on
    /// simultaneous registration.
    pub async fn register(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let map = self.map_for(session.role);
        let previous = {
            let mut guard = map.write().await;
            guard.insert(session.id.clone(), Arc::clone(&session))
        };

        if session.role == Role::Device {
            self.known_devices.write().await.insert(
                session.id.clone(),
                KnownDevice {
                    name: session.metadata.name.clone(),
                    device_type: session.metadata.device_type.clone(),
                },
            );
            self.telemetry.mark_reconnected(&session.id).await;
        }

        session.activate();
        previous
    }

    /// Remove an entry only if it is still the identical session (guards
    /// against a races where a newer session already replaced this one).
    pub async fn deregister(&self, role: Role, id: &str, session: &Arc<Session>) {
        let map = self.map_for(role);
        let mut guard = map.write().await;
        if let Some(current) = guard.get(id) {
            if Arc::ptr_eq(current, session) {
                guard.remove(id);
            }
        }
        drop(guard);

        if role == Role::Device {
            self.telemetry.mark_closed(id).await;
        }
    }

    pub async fn get(&self, role: Role, id: &str) -> Option<Arc<Session>> {
        self.map_for(role).read().await.get(id).cloned()
    }

    /// Snapshot of all active client sessions, for telemetry fan-out and
    /// directory-change notification.
    pub async fn snapshot_clients(&self) -> Vec<Arc<Session>> {
        self.clients.read().await.values().cloned().collect()
    }

    /// Snapshot of {id, name, type, connected} for every known device,
    /// including ones retained (disconnected but within the telemetry
    /// retention window).
    pub async fn list_devices(&self) -> Vec<DeviceInfo> {
        let devices = self.devices.read().await;
        let known = self.known_devices.read().await;
        known
            .iter()
            .map(|(id, meta)| DeviceInfo {
                id: id.clone(),
                name: meta.name.clone(),
                device_type: meta.device_type.clone(),
                connected: devices.contains_key(id),
            })
            .collect()
    }

    /// Notify every active client that a device's connectivity changed.
    pub async fn device_status_changed(&self, device_id: &str, status: &str) {
        let frame = codec::connection_status(device_id, status);
        for client in self.snapshot_clients().await {
            client.enqueue(&frame);
        }
    }

    /// Forget devices whose telemetry ring has aged out of the retention
    /// window, dropping their cached directory metadata too.
    pub async fn sweep_retention(&self, retention: Duration) {
        let forgotten = self.telemetry.sweep(retention).await;
        if forgotten.is_empty() {
            return;
        }
        let mut known = self.known_devices.write().await;
        for id in forgotten {
            known.remove(&id);
        }
    }

    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Snapshot every known device and client session and close them all,
    /// draining their write queues up to `drain_deadline`. Used for process
    /// shutdown teardown; does not touch the registry maps themselves — the
    /// closed sessions are left to be deregistered by their own read loops.
    pub async fn close_all(&self, drain_deadline: Duration) {
        let sessions: Vec<Arc<Session>> = {
            let devices = self.devices.read().await;
            let clients = self.clients.read().await;
            devices.values().chain(clients.values()).cloned().collect()
        };
        for session in sessions {
            session.close(drain_deadline).await;
        }
    }
}
