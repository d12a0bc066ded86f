// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

/// Configuration for the fleet relay hub.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "fleet-relay", about = "Relay hub for device/client telemetry and signaling")]
pub struct RelayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000, env = "PORT")]
    pub port: u16,

    /// Shared bearer/query token gating non-health endpoints. If unset, auth is disabled.
    #[arg(long, env = "AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Advisory reconnect attempt count surfaced to peers; the hub does not enforce it.
    #[arg(long, default_value_t = 5, env = "MAX_RECONNECT_ATTEMPTS")]
    pub max_reconnect_attempts: u32,

    /// Advisory reconnect interval in seconds, surfaced to peers.
    #[arg(long, default_value_t = 2, env = "RECONNECT_INTERVAL")]
    pub reconnect_interval_secs: u64,

    /// Extra per-envelope trace logging.
    #[arg(long, default_value_t = false, env = "DEBUG_MODE")]
    pub debug_mode: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Heartbeat deadline, seconds: a session idle past this since last activity is closed.
    #[arg(long, default_value_t = 30, env = "CONNECTION_TIMEOUT")]
    pub connection_timeout_secs: u64,

    /// Heartbeat period, seconds: how often the supervisor probes each session.
    #[arg(long, default_value_t = 20, env = "PING_INTERVAL")]
    pub ping_interval_secs: u64,

    /// Per-device telemetry ring capacity.
    #[arg(long, default_value_t = 100, env = "TELEMETRY_BUFFER_SIZE")]
    pub telemetry_buffer_size: usize,

    /// Per-session outbound queue capacity.
    #[arg(long, default_value_t = 256, env = "OUTBOUND_QUEUE_SIZE")]
    pub outbound_queue_size: usize,

    /// Idle timeout, seconds, for tracked signaling sessions.
    #[arg(long, default_value_t = 120, env = "SIGNALING_IDLE_TIMEOUT")]
    pub signaling_idle_timeout_secs: u64,
}

impl RelayConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn signaling_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.signaling_idle_timeout_secs)
    }

    /// Deadline for a single outbound write before the frame is abandoned.
    pub fn write_deadline(&self) -> Duration {
        Duration::from_secs(2)
    }

    /// Deadline for draining a session's outbound queue on close.
    pub fn close_drain_deadline(&self) -> Duration {
        Duration::from_secs(2)
    }

    /// How long a device's telemetry ring (and directory metadata) survives
    /// after its session last closed with no successor.
    pub fn telemetry_retention(&self) -> Duration {
        Duration::from_secs(5 * 60)
    }

    /// Interval of the background sweep that expires stale telemetry rings
    /// and idle signaling sessions.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(30)
    }
}
