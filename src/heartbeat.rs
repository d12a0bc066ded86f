// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session heartbeat supervisor: pings idle sessions and closes the ones
//! that never answer.

use std::sync::Arc;
use std::time::Duration;

use crate::codec;
use crate::session::Session;

/// Drive one session's heartbeat for as long as it is active.
///
/// Every `ping_interval` tick: if a previous ping is still unanswered and the
/// session has been idle at least `connection_timeout`, close the session and
/// return. Otherwise send a fresh ping and mark one outstanding. Returns when
/// the session's cancellation token fires (closed by another path, e.g.
/// supersession or disconnect).
pub async fn supervise(session: Arc<Session>, ping_interval: Duration, connection_timeout: Duration, drain_deadline: Duration) {
    let mut ticker = tokio::time::interval(ping_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if session.has_outstanding_heartbeat() && session.idle_duration() >= connection_timeout {
            tracing::info!(session_id = %session.id, role = ?session.role, "heartbeat timeout");
            session.close(drain_deadline).await;
            return;
        }

        session.enqueue(&codec::ping());
        session.mark_heartbeat_sent();
    }
}
