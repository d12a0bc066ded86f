// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded per-device ring of recent telemetry envelopes, for replay to
//! late-attaching clients.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;

/// One buffered telemetry frame plus its arrival time.
#[derive(Debug, Clone)]
pub struct TelemetryEntry {
    pub envelope: Value,
    pub arrived_at: Instant,
}

struct DeviceRing {
    entries: VecDeque<TelemetryEntry>,
    /// Set when the device's session closes with no successor; cleared on
    /// reconnect. The retention sweep forgets rings whose `closed_at` is
    /// older than the retention window.
    closed_at: Option<Instant>,
}

impl DeviceRing {
    fn new() -> Self {
        Self { entries: VecDeque::new(), closed_at: None }
    }
}

/// Bounded per-device ring buffer of telemetry, keyed by device id.
pub struct TelemetryBuffer {
    capacity: usize,
    rings: Mutex<HashMap<String, DeviceRing>>,
}

impl TelemetryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, rings: Mutex::new(HashMap::new()) }
    }

    /// Append a telemetry envelope to the device's ring, evicting the oldest
    /// entry first if at capacity. Creates the ring on first telemetry.
    pub async fn append(&self, device_id: &str, envelope: Value) {
        let mut rings = self.rings.lock().await;
        let ring = rings.entry(device_id.to_owned()).or_insert_with(DeviceRing::new);
        if ring.entries.len() >= self.capacity {
            ring.entries.pop_front();
        }
        ring.entries.push_back(TelemetryEntry { envelope, arrived_at: Instant::now() });
    }

    /// Snapshot of the device's buffered telemetry in arrival order.
    pub async fn replay(&self, device_id: &str) -> Vec<Value> {
        let rings = self.rings.lock().await;
        rings
            .get(device_id)
            .map(|ring| ring.entries.iter().map(|e| e.envelope.clone()).collect())
            .unwrap_or_default()
    }

    /// Current number of buffered entries for a device (used by the health probe).
    pub async fn depth(&self, device_id: &str) -> usize {
        let rings = self.rings.lock().await;
        rings.get(device_id).map(|r| r.entries.len()).unwrap_or(0)
    }

    /// Depths for every device with a ring, including empty/retained ones.
    pub async fn depths(&self) -> HashMap<String, usize> {
        let rings = self.rings.lock().await;
        rings.iter().map(|(id, ring)| (id.clone(), ring.entries.len())).collect()
    }

    /// Mark a device's ring as belonging to a now-closed session. The ring
    /// (and its entries) survive until the retention sweep forgets it.
    pub async fn mark_closed(&self, device_id: &str) {
        let mut rings = self.rings.lock().await;
        if let Some(ring) = rings.get_mut(device_id) {
            ring.closed_at = Some(Instant::now());
        }
    }

    /// Cancel a pending retention countdown — the device reconnected.
    pub async fn mark_reconnected(&self, device_id: &str) {
        let mut rings = self.rings.lock().await;
        if let Some(ring) = rings.get_mut(device_id) {
            ring.closed_at = None;
        }
    }

    /// Drop the ring for a device outright.
    pub async fn forget(&self, device_id: &str) {
        self.rings.lock().await.remove(device_id);
    }

    /// Forget every ring that has been closed (with no successor) for longer
    /// than `retention`. Returns the ids forgotten, so callers can also drop
    /// cached directory metadata for them.
    pub async fn sweep(&self, retention: Duration) -> Vec<String> {
        let mut rings = self.rings.lock().await;
        let stale: Vec<String> = rings
            .iter()
            .filter_map(|(id, ring)| match ring.closed_at {
                Some(closed_at) if closed_at.elapsed() >= retention => Some(id.clone()),
                _ => None,
            })
            .collect();
        for id in &stale {
            rings.remove(id);
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn append_and_replay_preserve_order() {
        let buf = TelemetryBuffer::new(100);
        buf.append("alpha", json!({"seq": 1})).await;
        buf.append("alpha", json!({"seq": 2})).await;
        buf.append("alpha", json!({"seq": 3})).await;
        let replayed = buf.replay("alpha").await;
        assert_eq!(replayed, vec![json!({"seq": 1}), json!({"seq": 2}), json!({"seq": 3})]);
    }

    #[tokio::test]
    async fn eviction_drops_oldest_first() {
        let buf = TelemetryBuffer::new(2);
        buf.append("alpha", json!({"seq": 1})).await;
        buf.append("alpha", json!({"seq": 2})).await;
        buf.append("alpha", json!({"seq": 3})).await;
        let replayed = buf.replay("alpha").await;
        assert_eq!(replayed, vec![json!({"seq": 2}), json!({"seq": 3})]);
        assert_eq!(buf.depth("alpha").await, 2);
    }

    #[tokio::test]
    async fn sweep_forgets_only_after_retention_elapses() {
        let buf = TelemetryBuffer::new(10);
        buf.append("alpha", json!({"seq": 1})).await;
        buf.mark_closed("alpha").await;

        let forgotten = buf.sweep(Duration::from_secs(60)).await;
        assert!(forgotten.is_empty());
        assert_eq!(buf.depth("alpha").await, 1);

        let forgotten = buf.sweep(Duration::from_millis(0)).await;
        assert_eq!(forgotten, vec!["alpha".to_owned()]);
        assert_eq!(buf.depth("alpha").await, 0);
    }

    #[tokio::test]
    async fn reconnect_cancels_pending_retention() {
        let buf = TelemetryBuffer::new(10);
        buf.append("alpha", json!({"seq": 1})).await;
        buf.mark_closed("alpha").await;
        buf.mark_reconnected("alpha").await;

        let forgotten = buf.sweep(Duration::from_millis(0)).await;
        assert!(forgotten.is_empty());
        assert_eq!(buf.depth("alpha").await, 1);
    }
}
