// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers: just the health probe. Everything else is WebSocket.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::RelayState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub device_count: usize,
    pub client_count: usize,
    pub frames_routed: HashMap<&'static str, u64>,
    pub telemetry_buffer_depths: HashMap<String, usize>,
}

/// `GET /health`
pub async fn health(State(s): State<Arc<RelayState>>) -> impl IntoResponse {
    let body = HealthResponse {
        status: "running".to_owned(),
        uptime_secs: s.started_at.elapsed().as_secs(),
        device_count: s.registry.device_count().await,
        client_count: s.registry.client_count().await,
        frames_routed: s.metrics.snapshot(),
        telemetry_buffer_depths: s.registry.telemetry.depths().await,
    };
    Json(body)
}
