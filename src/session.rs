// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single connected endpoint: its role, queues, heartbeat state, and
//! lifecycle.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Endpoint role: a vehicle producing telemetry, or an operator app consuming it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Device,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Client => "client",
        }
    }
}

/// Session lifecycle. Transitions only move forward; `closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Registering,
    Active,
    Draining,
    Closed,
}

impl Lifecycle {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Registering,
            1 => Self::Active,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Registering => 0,
            Self::Active => 1,
            Self::Draining => 2,
            Self::Closed => 3,
        }
    }
}

/// Human-readable attributes supplied at registration time, e.g. from query
/// parameters on the WebSocket upgrade.
#[derive(Debug, Clone, Default)]
pub struct SessionMetadata {
    pub name: Option<String>,
    pub device_type: Option<String>,
}

/// Result of attempting to enqueue a frame onto a session's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Sent,
    /// The session is not `active`; the frame was not sent.
    NotActive,
    /// The outbound queue was saturated; the frame was dropped.
    QueueOverflow,
}

/// A single connected endpoint.
///
/// The read flow (owned by the transport adapter) pulls frames straight off
/// the WebSocket and hands them to the router without an intermediate
/// channel — the socket's own buffering is the inbound queue described in
/// the data model. The outbound queue is the bounded channel below, drained
/// by the session's write flow.
pub struct Session {
    pub id: String,
    pub role: Role,
    pub metadata: SessionMetadata,
    pub first_seen: Instant,
    pub cancel: CancellationToken,

    outbound_tx: mpsc::Sender<Arc<str>>,
    lifecycle: AtomicU8,
    outstanding_heartbeat: AtomicBool,
    last_activity: std::sync::Mutex<Instant>,
}

impl Session {
    pub fn new(
        id: String,
        role: Role,
        metadata: SessionMetadata,
        outbound_capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_capacity);
        let now = Instant::now();
        let session = Arc::new(Self {
            id,
            role,
            metadata,
            first_seen: now,
            cancel: CancellationToken::new(),
            outbound_tx,
            lifecycle: AtomicU8::new(Lifecycle::Registering.as_u8()),
            outstanding_heartbeat: AtomicBool::new(false),
            last_activity: std::sync::Mutex::new(now),
        });
        (session, outbound_rx)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    fn set_lifecycle(&self, state: Lifecycle) {
        self.lifecycle.store(state.as_u8(), Ordering::Release);
    }

    /// Move from `registering` to `active`. A session only accepts enqueues
    /// once active.
    pub fn activate(&self) {
        self.set_lifecycle(Lifecycle::Active);
    }

    /// Record inbound traffic: clears the outstanding-heartbeat flag and
    /// bumps the idle clock, per the heartbeat supervisor's liveness contract.
    pub fn touch(&self) {
        self.outstanding_heartbeat.store(false, Ordering::Release);
        if let Ok(mut guard) = self.last_activity.lock() {
            *guard = Instant::now();
        }
    }

    pub fn idle_duration(&self) -> Duration {
        let last = self.last_activity.lock().map(|g| *g).unwrap_or_else(|_| Instant::now());
        last.elapsed()
    }

    pub fn mark_heartbeat_sent(&self) {
        self.outstanding_heartbeat.store(true, Ordering::Release);
    }

    pub fn clear_heartbeat(&self) {
        self.outstanding_heartbeat.store(false, Ordering::Release);
    }

    pub fn has_outstanding_heartbeat(&self) -> bool {
        self.outstanding_heartbeat.load(Ordering::Acquire)
    }

    /// Best-effort enqueue onto the outbound queue. Fails without blocking
    /// when the session isn't active or the queue is saturated.
    pub fn enqueue(&self, frame: &serde_json::Value) -> EnqueueResult {
        if self.lifecycle() != Lifecycle::Active {
            return EnqueueResult::NotActive;
        }
        let text: Arc<str> = Arc::from(crate::codec::encode(frame));
        match self.outbound_tx.try_send(text) {
            Ok(()) => EnqueueResult::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => EnqueueResult::QueueOverflow,
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueResult::NotActive,
        }
    }

    /// Idempotent close: transitions to `draining`, waits for the write flow
    /// to empty the outbound queue up to `drain_deadline`, then marks
    /// `closed` and cancels the session's tasks (stopping the read/write
    /// flows deterministically).
    pub async fn close(&self, drain_deadline: Duration) {
        if self.lifecycle() == Lifecycle::Closed {
            return;
        }
        self.set_lifecycle(Lifecycle::Draining);

        let deadline = Instant::now() + drain_deadline;
        while Instant::now() < deadline {
            if self.outbound_tx.capacity() == self.outbound_tx.max_capacity() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        self.set_lifecycle(Lifecycle::Closed);
        self.cancel.cancel();
    }
}
