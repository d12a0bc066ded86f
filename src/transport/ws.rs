// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket upgrade handlers for `/device/{id}` and `/client/{id}`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, RawQuery, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::codec;
use crate::error::EnvelopeErrorKind;
use crate::router;
use crate::session::{Role, Session, SessionMetadata};
use crate::state::RelayState;
use crate::transport::auth::validate_ws_query;

#[derive(Debug, Deserialize, Default)]
pub struct DeviceParams {
    name: Option<String>,
    #[serde(rename = "type")]
    device_type: Option<String>,
}

pub async fn device_handler(
    Path(id): Path<String>,
    Query(params): Query<DeviceParams>,
    RawQuery(query): RawQuery,
    State(state): State<Arc<RelayState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if let Err(e) =
        validate_ws_query(query.as_deref().unwrap_or(""), state.config.auth_token.as_deref())
    {
        return e.to_http_response("unauthorized").into_response();
    }

    let metadata = SessionMetadata { name: params.name, device_type: params.device_type };
    ws.on_upgrade(move |socket| handle_socket(socket, state, Role::Device, id, metadata))
        .into_response()
}

pub async fn client_handler(
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
    State(state): State<Arc<RelayState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if let Err(e) =
        validate_ws_query(query.as_deref().unwrap_or(""), state.config.auth_token.as_deref())
    {
        return e.to_http_response("unauthorized").into_response();
    }

    ws.on_upgrade(move |socket| {
        handle_socket(socket, state, Role::Client, id, SessionMetadata::default())
    })
    .into_response()
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<RelayState>,
    role: Role,
    id: String,
    metadata: SessionMetadata,
) {
    let (mut sink, mut stream) = socket.split();
    let (session, mut outbound_rx) =
        Session::new(id.clone(), role, metadata, state.config.outbound_queue_size);

    let previous = state.registry.register(Arc::clone(&session)).await;
    if let Some(previous) = previous {
        tracing::info!(role = ?role, id = %id, "superseding existing session");
        if role == Role::Device {
            state.registry.device_status_changed(&id, "disconnected").await;
        }
        previous.close(state.config.close_drain_deadline()).await;
        if role == Role::Device {
            state.registry.device_status_changed(&id, "connected").await;
        }
    } else if role == Role::Device {
        state.registry.device_status_changed(&id, "connected").await;
    }

    let write_deadline = state.config.write_deadline();
    let writer_session = Arc::clone(&session);
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_session.cancel.cancelled() => break,
                frame = outbound_rx.recv() => {
                    let Some(text) = frame else { break };
                    let send = sink.send(Message::Text(text.to_string().into()));
                    if tokio::time::timeout(write_deadline, send).await.is_err() {
                        tracing::debug!(session_id = %writer_session.id, "write deadline exceeded");
                        break;
                    }
                }
            }
        }
        let _ = sink.close().await;
    });

    let heartbeat = tokio::spawn(crate::heartbeat::supervise(
        Arc::clone(&session),
        state.config.ping_interval(),
        state.config.connection_timeout(),
        state.config.close_drain_deadline(),
    ));

    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => break,
            next = stream.next() => {
                match next {
                    Some(Ok(Message::Text(text))) => {
                        session.touch();
                        match codec::decode(&text) {
                            Ok(envelope) => {
                                router::dispatch(&state.registry, &state.signaling, &state.metrics, &session, envelope, state.config.debug_mode).await;
                            }
                            Err(kind) => reply_if_reported(&session, kind),
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        session.touch();
                        reply_if_reported(&session, EnvelopeErrorKind::Malformed);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Err(e)) => {
                        tracing::debug!(session_id = %session.id, err = %e, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    session.close(state.config.close_drain_deadline()).await;
    state.registry.deregister(role, &id, &session).await;
    state.signaling.close_all_for(role, &id).await;
    if role == Role::Device {
        state.registry.device_status_changed(&id, "disconnected").await;
    }

    heartbeat.abort();
    let _ = writer.await;
}

fn reply_if_reported(session: &Arc<Session>, kind: EnvelopeErrorKind) {
    if kind.is_reported_to_sender() {
        session.enqueue(&codec::error(kind, "frame rejected"));
    }
}
