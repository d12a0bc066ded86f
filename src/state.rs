// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::registry::SessionRegistry;
use crate::router::RouterMetrics;
use crate::signaling::SignalingTracker;

/// Shared relay state handed to every Axum handler.
pub struct RelayState {
    pub registry: Arc<SessionRegistry>,
    pub signaling: Arc<SignalingTracker>,
    pub metrics: Arc<RouterMetrics>,
    pub config: RelayConfig,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl RelayState {
    pub fn new(config: RelayConfig, shutdown: CancellationToken) -> Self {
        let telemetry_capacity = config.telemetry_buffer_size;
        Self {
            registry: Arc::new(SessionRegistry::new(telemetry_capacity)),
            signaling: Arc::new(SignalingTracker::new()),
            metrics: Arc::new(RouterMetrics::default()),
            config,
            shutdown,
            started_at: Instant::now(),
        }
    }
}
