// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fleet-relay: WebSocket hub routing telemetry, commands, and WebRTC
//! signaling between autonomous devices and operator clients.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod codec;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod registry;
pub mod router;
pub mod session;
pub mod signaling;
pub mod state;
pub mod telemetry;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::state::RelayState;
use crate::transport::build_router;

/// Run the relay hub until shutdown.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    let sweep_interval = config.sweep_interval();
    let telemetry_retention = config.telemetry_retention();
    let signaling_idle_timeout = config.signaling_idle_timeout();

    let state = Arc::new(RelayState::new(config, shutdown.clone()));
    spawn_sweeper(Arc::clone(&state), sweep_interval, telemetry_retention, signaling_idle_timeout);

    tracing::info!(%addr, "fleet-relay listening");
    let drain_deadline = state.config.close_drain_deadline();
    let teardown_state = Arc::clone(&state);
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    tracing::info!("shutting_down: closing all sessions");
    teardown_state.registry.close_all(drain_deadline).await;

    Ok(())
}

/// Periodic task expiring stale telemetry rings and idle signaling sessions.
fn spawn_sweeper(
    state: Arc<RelayState>,
    interval: std::time::Duration,
    telemetry_retention: std::time::Duration,
    signaling_idle_timeout: std::time::Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }
            state.registry.sweep_retention(telemetry_retention).await;
            let swept = state.signaling.sweep(signaling_idle_timeout).await;
            if swept > 0 {
                tracing::debug!(count = swept, "swept idle signaling sessions");
            }
        }
    });
}
