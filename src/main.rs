// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use fleet_relay::config::RelayConfig;

#[tokio::main]
async fn main() {
    let config = RelayConfig::parse();
    init_tracing(&config);

    if let Err(e) = fleet_relay::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber from config.
///
/// Priority: `--log-level`/`LOG_LEVEL` > bare `RUST_LOG` > default ("info").
fn init_tracing(config: &RelayConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = if std::env::var("LOG_LEVEL").is_err() && config.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
