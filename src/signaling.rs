// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ephemeral bookkeeping for in-flight WebRTC offer/answer/ICE negotiations.
//!
//! The tracker does not gate routing — a `webrtc` envelope is still routed by
//! its addressing fields regardless of tracker state. It exists so
//! "which negotiation does this ICE candidate belong to" is answerable and
//! testable, and so stale negotiations can be logged and swept.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::session::Role;

/// Key identifying one client/device negotiation.
pub type SignalingKey = (String, String);

struct SignalingEntry {
    #[allow(dead_code)]
    token: Option<String>,
    #[allow(dead_code)]
    created_at: Instant,
    last_seen: Instant,
}

/// Tracks ephemeral signaling sessions keyed by (client_id, device_id).
pub struct SignalingTracker {
    sessions: Mutex<HashMap<SignalingKey, SignalingEntry>>,
}

impl SignalingTracker {
    pub fn new() -> Self {
        Self { sessions: Mutex::new(HashMap::new()) }
    }

    /// Open (or refresh) a signaling session for a client/device pair,
    /// typically on `offer`.
    pub async fn open(&self, client_id: &str, device_id: &str, token: Option<String>) {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        sessions
            .entry((client_id.to_owned(), device_id.to_owned()))
            .and_modify(|e| e.last_seen = now)
            .or_insert(SignalingEntry { token, created_at: now, last_seen: now });
    }

    /// Refresh the idle clock for a pair, if tracked. Returns whether an
    /// entry existed (useful only for diagnostics — routing never depends on
    /// this).
    pub async fn touch(&self, client_id: &str, device_id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&(client_id.to_owned(), device_id.to_owned())) {
            Some(entry) => {
                entry.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// End a signaling session, e.g. on `close`/`error` subtype.
    pub async fn close(&self, client_id: &str, device_id: &str) {
        self.sessions.lock().await.remove(&(client_id.to_owned(), device_id.to_owned()));
    }

    /// Drop every signaling session involving the given endpoint, e.g. on
    /// disconnect.
    pub async fn close_all_for(&self, role: Role, id: &str) {
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|(client_id, device_id), _| match role {
            Role::Client => client_id != id,
            Role::Device => device_id != id,
        });
    }

    /// Remove signaling sessions idle past `idle_timeout`. Returns the
    /// number swept, for observability.
    pub async fn sweep(&self, idle_timeout: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen.elapsed() < idle_timeout);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

impl Default for SignalingTracker {
    fn default() -> Self {
        Self::new()
    }
}
