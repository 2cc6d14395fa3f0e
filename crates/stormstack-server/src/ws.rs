//! WebSocket handlers: snapshot/delta streams and the command stream.
//!
//! The token arrives at upgrade level, via the `Bearer.<token>`
//! sub-protocol (preferred) or a `?token=` query parameter, and is
//! validated before the upgrade completes so rejections surface as
//! ordinary HTTP errors.

use crate::state::SharedAppState;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use stormstack_auth::MatchClaims;
use stormstack_core::{ConnectionId, ContainerId, MatchId, Scope, StormError};
use stormstack_net::{ApiError, BearerToken};
use stormstack_ws::{ClientMessage, Outbound, ServerMessage, SnapshotSubscriber, SubscriptionMode};
use tracing::{debug, trace, warn};

/// Close code used for policy-level closes (slow consumer).
const POLICY_CLOSE: u16 = 1008;

fn upgrade_token(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<BearerToken> {
    let protocols = headers
        .get("sec-websocket-protocol")
        .and_then(|value| value.to_str().ok());
    BearerToken::from_upgrade(protocols, query.get("token").map(String::as_str))
}

fn authorize_stream(
    state: &SharedAppState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
    container_id: ContainerId,
    match_id: Option<MatchId>,
    scope: Scope,
) -> Result<MatchClaims, ApiError> {
    let token = upgrade_token(headers, query).ok_or_else(|| {
        ApiError::from(StormError::InvalidToken(
            "missing upgrade token".to_string(),
        ))
    })?;
    let claims = state.gate.validate(&token.0)?;
    state.gate.require_scope(&claims, scope)?;
    let target_match = match_id.unwrap_or(claims.match_id);
    state
        .gate
        .authorize_target(&claims, target_match, Some(container_id))?;
    Ok(claims)
}

/// `GET /ws/containers/{id}/matches/{matchId}/snapshot`
pub async fn snapshot_stream(
    State(state): State<SharedAppState>,
    Path((container_id, match_id)): Path<(ContainerId, MatchId)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    stream_with_mode(
        state,
        container_id,
        match_id,
        query,
        headers,
        upgrade,
        SubscriptionMode::Full,
    )
}

/// `GET /ws/containers/{id}/matches/{matchId}/delta`
pub async fn delta_stream(
    State(state): State<SharedAppState>,
    Path((container_id, match_id)): Path<(ContainerId, MatchId)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    stream_with_mode(
        state,
        container_id,
        match_id,
        query,
        headers,
        upgrade,
        SubscriptionMode::Delta,
    )
}

fn stream_with_mode(
    state: SharedAppState,
    container_id: ContainerId,
    match_id: MatchId,
    query: HashMap<String, String>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
    mode: SubscriptionMode,
) -> Response {
    let claims = match authorize_stream(
        &state,
        &headers,
        &query,
        container_id,
        Some(match_id),
        Scope::ViewSnapshots,
    ) {
        Ok(claims) => claims,
        Err(error) => return error.into_response(),
    };

    upgrade.on_upgrade(move |socket| async move {
        debug!(
            %container_id,
            %match_id,
            player = %claims.player_id,
            ?mode,
            "snapshot stream opened"
        );
        run_snapshot_stream(socket, state, match_id, mode).await;
    })
}

async fn run_snapshot_stream(
    socket: WebSocket,
    state: SharedAppState,
    match_id: MatchId,
    mode: SubscriptionMode,
) {
    let connection_id = ConnectionId::new();
    let mut frames = state.fanout.subscribe(match_id);
    let mut subscriber = SnapshotSubscriber::new(mode);
    let (outbound, mut outbox) = Outbound::new(connection_id);
    let (mut sink, mut reader) = socket.split();

    let slow = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let slow_seen = std::sync::Arc::clone(&slow);

    // Writer task: drain the bounded outbound queue onto the socket, then
    // close with a reason when the consumer fell behind.
    let writer = tokio::spawn(async move {
        while let Some(text) = outbox.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        let frame = slow_seen
            .load(std::sync::atomic::Ordering::Acquire)
            .then(|| CloseFrame {
                code: POLICY_CLOSE,
                reason: "SLOW_CONSUMER".into(),
            });
        let _ = sink.send(Message::Close(frame)).await;
    });

    loop {
        tokio::select! {
            changed = frames.changed() => {
                if changed.is_err() {
                    // Match reached a terminal state; no further frames.
                    break;
                }
                let frame = frames.borrow_and_update().clone();
                if let Some(frame) = frame {
                    let message = subscriber.render(&frame);
                    match outbound.send(&message) {
                        Ok(()) => {}
                        Err(StormError::SlowConsumer(_)) => {
                            warn!(%connection_id, %match_id, "closing slow consumer");
                            slow.store(true, std::sync::atomic::Ordering::Release);
                            break;
                        }
                        Err(_) => break,
                    }
                }
            }
            received = reader.next() => {
                match received {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => trace!(%connection_id, "ignoring inbound frame on snapshot stream"),
                    Some(Err(_)) => break,
                }
            }
        }
    }

    drop(outbound);
    let _ = writer.await;
    debug!(%connection_id, %match_id, "snapshot stream closed");
}

/// `GET /ws/containers/{id}/commands`
pub async fn command_stream(
    State(state): State<SharedAppState>,
    Path(container_id): Path<ContainerId>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let claims = match authorize_stream(
        &state,
        &headers,
        &query,
        container_id,
        None,
        Scope::SubmitCommands,
    ) {
        Ok(claims) => claims,
        Err(error) => return error.into_response(),
    };

    upgrade.on_upgrade(move |socket| async move {
        debug!(%container_id, player = %claims.player_id, "command stream opened");
        run_command_stream(socket, state, container_id, claims).await;
    })
}

async fn run_command_stream(
    socket: WebSocket,
    state: SharedAppState,
    container_id: ContainerId,
    claims: MatchClaims,
) {
    let connection_id = ConnectionId::new();
    let container = match state.containers.get(container_id) {
        Ok(container) => container,
        Err(_) => return,
    };

    // receive_errors-scoped connections also stream the per-match error
    // events captured during ticks.
    let mut errors = claims
        .has_scope(Scope::ReceiveErrors)
        .then(|| container.subscribe_errors());

    let (outbound, mut outbox) = Outbound::new(connection_id);
    let (mut sink, mut reader) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(text) = outbox.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            event = recv_error(&mut errors) => {
                if let Some(event) = event {
                    if event.match_id == claims.match_id
                        && outbound.send(&ServerMessage::CommandError { event }).is_err()
                    {
                        break;
                    }
                }
            }
            received = reader.next() => {
                let text = match received {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                };

                let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(ClientMessage::Command { match_id, name, payload }) => {
                        let outcome = state
                            .gate
                            .authorize_target(&claims, match_id, Some(container_id))
                            .and_then(|()| {
                                container.submit_command(
                                    match_id,
                                    claims.player_id,
                                    &name,
                                    &payload,
                                )
                            });
                        match outcome {
                            Ok(()) => ServerMessage::CommandAccepted { name },
                            Err(error) => ServerMessage::Error {
                                code: error.code().to_string(),
                                message: error.to_string(),
                            },
                        }
                    }
                    Ok(ClientMessage::Ping { timestamp }) => ServerMessage::Pong {
                        timestamp,
                        server_time: Utc::now().timestamp_millis(),
                    },
                    Err(error) => ServerMessage::Error {
                        code: "BAD_REQUEST".to_string(),
                        message: format!("unparseable message: {error}"),
                    },
                };

                if outbound.send(&reply).is_err() {
                    break;
                }
            }
        }
    }

    drop(outbound);
    let _ = writer.await;
    debug!(%connection_id, %container_id, "command stream closed");
}

async fn recv_error(
    errors: &mut Option<tokio::sync::broadcast::Receiver<stormstack_engine::ErrorEvent>>,
) -> Option<stormstack_engine::ErrorEvent> {
    match errors {
        Some(receiver) => match receiver.recv().await {
            Ok(event) => Some(event),
            // Lagged subscribers just skip ahead; closed means container gone.
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => None,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                std::future::pending::<()>().await;
                None
            }
        },
        None => {
            std::future::pending::<()>().await;
            None
        }
    }
}
