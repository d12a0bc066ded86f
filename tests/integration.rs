// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket integration tests using real connections against an in-process
//! axum server, covering the end-to-end scenarios of the relay's routing
//! contract.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use fleet_relay::config::RelayConfig;
use fleet_relay::state::RelayState;
use fleet_relay::transport::build_router;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsTx = futures_util::stream::SplitSink<WsStream, WsMessage>;
type WsRx = futures_util::stream::SplitStream<WsStream>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawn the relay server on an ephemeral port; returns its address and a
/// shutdown handle dropped at the end of each test.
async fn spawn_server(config: RelayConfig) -> anyhow::Result<(SocketAddr, CancellationToken)> {
    let shutdown = CancellationToken::new();
    let state = Arc::new(RelayState::new(config, shutdown.clone()));
    let router = build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_clone.cancelled_owned())
            .await;
    });

    Ok((addr, shutdown))
}

fn test_config() -> RelayConfig {
    RelayConfig::parse_from(["fleet-relay"])
}

async fn ws_connect(addr: &SocketAddr, path: &str) -> anyhow::Result<(WsTx, WsRx)> {
    let url = format!("ws://{addr}{path}");
    let (stream, _) =
        tokio_tungstenite::connect_async(&url).await.map_err(|e| anyhow::anyhow!("ws connect: {e}"))?;
    Ok(stream.split())
}

async fn ws_send(tx: &mut WsTx, value: &serde_json::Value) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    tx.send(WsMessage::Text(text.into())).await.map_err(|e| anyhow::anyhow!("ws send: {e}"))?;
    Ok(())
}

async fn ws_recv(rx: &mut WsRx) -> anyhow::Result<serde_json::Value> {
    let msg = tokio::time::timeout(RECV_TIMEOUT, rx.next())
        .await
        .map_err(|_| anyhow::anyhow!("ws recv timeout"))?
        .ok_or_else(|| anyhow::anyhow!("ws stream closed"))?
        .map_err(|e| anyhow::anyhow!("ws recv: {e}"))?;

    match msg {
        WsMessage::Text(text) => Ok(serde_json::from_str(&text)?),
        other => anyhow::bail!("expected Text message, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Scenario 1: registration supersedes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn registration_supersedes_and_notifies_clients() -> anyhow::Result<()> {
    let (addr, _shutdown) = spawn_server(test_config()).await?;

    let (mut client_tx, mut client_rx) = ws_connect(&addr, "/client/c1").await?;
    let (_first_tx, mut first_rx) = ws_connect(&addr, "/device/alpha").await?;
    // Let the first device's registration settle before the second connects.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (_second_tx, _second_rx) = ws_connect(&addr, "/device/alpha").await?;

    // First session observes its socket close.
    let closed = tokio::time::timeout(RECV_TIMEOUT, first_rx.next()).await?;
    assert!(matches!(closed, Some(Ok(WsMessage::Close(_))) | None));

    let first_status = ws_recv(&mut client_rx).await?;
    assert_eq!(first_status["type"], "connection_status");
    assert_eq!(first_status["status"], "disconnected");

    let second_status = ws_recv(&mut client_rx).await?;
    assert_eq!(second_status["type"], "connection_status");
    assert_eq!(second_status["status"], "connected");

    ws_send(&mut client_tx, &serde_json::json!({"type": "devices_list"})).await?;
    let listing = ws_recv(&mut client_rx).await?;
    assert_eq!(listing["devices"][0]["connected"], true);

    Ok(())
}

// ---------------------------------------------------------------------------
// Scenario 2: fan-out to multiple clients
// ---------------------------------------------------------------------------

#[tokio::test]
async fn telemetry_fans_out_to_every_client_in_order() -> anyhow::Result<()> {
    let (addr, _shutdown) = spawn_server(test_config()).await?;

    let (_c1_tx, mut c1_rx) = ws_connect(&addr, "/client/c1").await?;
    let (_c2_tx, mut c2_rx) = ws_connect(&addr, "/client/c2").await?;
    let (_c3_tx, mut c3_rx) = ws_connect(&addr, "/client/c3").await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (mut device_tx, _device_rx) = ws_connect(&addr, "/device/beta").await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    for seq in 1..=3 {
        ws_send(&mut device_tx, &serde_json::json!({"type": "telemetry", "seq": seq})).await?;
    }

    for rx in [&mut c1_rx, &mut c2_rx, &mut c3_rx] {
        for expected_seq in 1..=3 {
            let frame = ws_recv(rx).await?;
            assert_eq!(frame["type"], "telemetry");
            assert_eq!(frame["seq"], expected_seq);
            assert_eq!(frame["deviceId"], "beta");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Scenario 3: late attach replay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_attach_replays_buffered_telemetry_in_order() -> anyhow::Result<()> {
    let (addr, _shutdown) = spawn_server(test_config()).await?;

    let (mut device_tx, _device_rx) = ws_connect(&addr, "/device/alpha").await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    for seq in 10..=14 {
        ws_send(&mut device_tx, &serde_json::json!({"type": "telemetry", "seq": seq})).await?;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (mut client_tx, mut client_rx) = ws_connect(&addr, "/client/c1").await?;
    ws_send(&mut client_tx, &serde_json::json!({"type": "connect_device", "deviceId": "alpha"}))
        .await?;

    let connected = ws_recv(&mut client_rx).await?;
    assert_eq!(connected["type"], "device_connected");
    assert_eq!(connected["status"], "connected");

    for expected_seq in 10..=14 {
        let frame = ws_recv(&mut client_rx).await?;
        assert_eq!(frame["type"], "telemetry");
        assert_eq!(frame["seq"], expected_seq);
    }

    ws_send(&mut device_tx, &serde_json::json!({"type": "telemetry", "seq": 15})).await?;
    let frame = ws_recv(&mut client_rx).await?;
    assert_eq!(frame["seq"], 15);

    Ok(())
}

// ---------------------------------------------------------------------------
// Scenario 4: signaling relay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn webrtc_offer_and_answer_relay_verbatim() -> anyhow::Result<()> {
    let (addr, _shutdown) = spawn_server(test_config()).await?;

    let (mut client_tx, mut client_rx) = ws_connect(&addr, "/client/c1").await?;
    let (mut device_tx, mut device_rx) = ws_connect(&addr, "/device/alpha").await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    ws_send(
        &mut client_tx,
        &serde_json::json!({"type": "webrtc", "subtype": "offer", "deviceId": "alpha", "sdp": "S"}),
    )
    .await?;

    let offer = ws_recv(&mut device_rx).await?;
    assert_eq!(offer["subtype"], "offer");
    assert_eq!(offer["clientId"], "c1");
    assert_eq!(offer["sdp"], "S");

    ws_send(
        &mut device_tx,
        &serde_json::json!({"type": "webrtc", "subtype": "answer", "clientId": "c1", "sdp": "A"}),
    )
    .await?;

    let answer = ws_recv(&mut client_rx).await?;
    assert_eq!(answer["subtype"], "answer");
    assert_eq!(answer["sdp"], "A");
    assert_eq!(answer["deviceId"], "alpha");

    Ok(())
}

// ---------------------------------------------------------------------------
// Scenario 5: command to absent device
// ---------------------------------------------------------------------------

#[tokio::test]
async fn command_to_absent_device_reports_device_unavailable() -> anyhow::Result<()> {
    let (addr, _shutdown) = spawn_server(test_config()).await?;

    let (mut client_tx, mut client_rx) = ws_connect(&addr, "/client/c1").await?;
    ws_send(
        &mut client_tx,
        &serde_json::json!({
            "type": "command",
            "deviceId": "ghost",
            "command": "stop",
            "command_id": "c1-1-T",
        }),
    )
    .await?;

    let reply = ws_recv(&mut client_rx).await?;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["kind"], "device_unavailable");
    assert!(reply["message"].as_str().unwrap().contains("ghost"));

    Ok(())
}

// ---------------------------------------------------------------------------
// Scenario 6: heartbeat expiry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unresponsive_session_is_closed_on_heartbeat_timeout() -> anyhow::Result<()> {
    let mut config = test_config();
    config.ping_interval_secs = 1;
    config.connection_timeout_secs = 0;

    let (addr, _shutdown) = spawn_server(config).await?;

    let (mut client_tx, mut client_rx) = ws_connect(&addr, "/client/c1").await?;
    let (_device_tx, mut device_rx) = ws_connect(&addr, "/device/alpha").await?;
    ws_send(&mut client_tx, &serde_json::json!({"type": "devices_list"})).await?;
    let _ = ws_recv(&mut client_rx).await?;

    let closed = tokio::time::timeout(RECV_TIMEOUT, device_rx.next()).await?;
    assert!(matches!(closed, Some(Ok(_)) | None));

    let status = ws_recv(&mut client_rx).await?;
    assert_eq!(status["type"], "connection_status");
    assert_eq!(status["deviceId"], "alpha");
    assert_eq!(status["status"], "disconnected");

    Ok(())
}
