//! The subscription gateway: a WebSocket endpoint that authenticates on
//! attach, binds a connection to one or more channel topics, and streams
//! events until the connection closes or is disconnected for being a slow
//! consumer.
//!
//! The reader and writer run as separate tasks sharing a per-connection
//! `CancellationToken`, mirroring the split used throughout the service's
//! other background workers (own task, own shutdown path).

use std::{
    collections::HashMap,
    time::Duration,
};

use axum::{
    extract::{
        ws::{
            Message,
            WebSocket,
            WebSocketUpgrade,
        },
        Query,
        State,
    },
    response::IntoResponse,
};
use futures::{
    SinkExt,
    StreamExt,
};
use serde::{
    Deserialize,
    Serialize,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    instrument,
    warn,
};

use crate::{
    auth::Claims,
    event_bus::{
        DisconnectCause,
        Event,
        EventPayload,
    },
    ids::{
        ChannelId,
        UserId,
    },
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct AttachQuery {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientControl {
    Subscribe { channel_id: ChannelId },
    Unsubscribe { channel_id: ChannelId },
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerControl<'a> {
    Event {
        #[serde(flatten)]
        event: &'a Event,
    },
    Pong,
    Error { message: String },
}

/// `GET /ws?token=...` — verifies the credential before completing the
/// upgrade, per the authenticator's contract for subscription attach.
pub async fn attach(
    State(state): State<AppState>,
    Query(query): Query<AttachQuery>,
    headers: axum::http::HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = query.token.or_else(|| {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
    });

    let claims = match token.as_deref().map(|t| state.authenticator.verify(t)) {
        Some(Ok(claims)) => claims,
        _ => return axum::http::StatusCode::UNAUTHORIZED.into_response(),
    };

    ws.on_upgrade(move |socket| handle_connection(socket, state, claims))
}

#[instrument(skip(socket, state, claims), fields(user = %claims.sub))]
async fn handle_connection(socket: WebSocket, state: AppState, claims: Claims) {
    let cancel = CancellationToken::new();
    let (mut writer, mut reader) = socket.split();

    let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::channel::<ServerFrame>(
        state.subscriber_queue_max,
    );

    let writer_cancel = cancel.clone();
    let writer_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(state.subscriber_idle / 2);
        loop {
            tokio::select! {
                () = writer_cancel.cancelled() => break,
                _ = ping_interval.tick() => {
                    if writer.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else { break };
                    let text = match frame {
                        ServerFrame::Control(text) => text,
                        ServerFrame::Event(event) => {
                            serde_json::to_string(&ServerControl::Event { event: &event })
                                .unwrap_or_default()
                        }
                    };
                    if writer.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            }
        }
        writer_cancel.cancel();
    });

    let mut joined: HashMap<ChannelId, tokio::task::JoinHandle<()>> = HashMap::new();
    let reader_cancel = cancel.clone();
    let idle = state.subscriber_idle;

    loop {
        tokio::select! {
            () = reader_cancel.cancelled() => break,
            () = tokio::time::sleep(idle) => {
                // no pong observed within the idle window; the writer's
                // ping loop already tried, so treat this as a dead peer.
                break;
            }
            frame = reader.next() => {
                let Some(frame) = frame else { break };
                match frame {
                    Ok(Message::Text(text)) => {
                        handle_control_frame(
                            &text,
                            &state,
                            claims.sub,
                            &outbound_tx,
                            &mut joined,
                        )
                        .await;
                    }
                    Ok(Message::Pong(_) | Message::Ping(_)) => {}
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(Message::Binary(_)) => {}
                }
            }
        }
    }

    cancel.cancel();
    for (channel_id, handle) in joined.drain() {
        handle.abort();
        state.bus.mark_left(channel_id, claims.sub).await;
        state
            .bus
            .publish(
                channel_id,
                EventPayload::ParticipantLeft { user_id: claims.sub },
                chrono::Utc::now(),
            )
            .await;
    }
    let _ = writer_task.await;
}

enum ServerFrame {
    Event(Event),
    Control(String),
}

async fn handle_control_frame(
    text: &str,
    state: &AppState,
    user_id: UserId,
    outbound_tx: &tokio::sync::mpsc::Sender<ServerFrame>,
    joined: &mut HashMap<ChannelId, tokio::task::JoinHandle<()>>,
) {
    let control: ClientControl = match serde_json::from_str(text) {
        Ok(c) => c,
        Err(_) => {
            let _ = outbound_tx
                .send(ServerFrame::Control(
                    serde_json::to_string(&ServerControl::Error {
                        message: "malformed control frame".to_string(),
                    })
                    .unwrap_or_default(),
                ))
                .await;
            return;
        }
    };

    match control {
        ClientControl::Ping => {
            let _ = outbound_tx
                .send(ServerFrame::Control(
                    serde_json::to_string(&ServerControl::Pong).unwrap_or_default(),
                ))
                .await;
        }
        ClientControl::Subscribe { channel_id } => {
            if joined.contains_key(&channel_id) {
                return;
            }
            if state.store.channel_by_id(channel_id).await.is_err() {
                warn!(%channel_id, "subscribe request for unknown channel");
                return;
            }
            let mut subscription = state.bus.subscribe(channel_id).await;
            let tx = outbound_tx.clone();
            let handle = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        event = subscription.events.recv() => {
                            let Some(event) = event else { break };
                            if tx.send(ServerFrame::Event(event)).await.is_err() {
                                break;
                            }
                        }
                        cause = &mut subscription.disconnected => {
                            if matches!(cause, Ok(DisconnectCause::SlowConsumer)) {
                                let _ = tx
                                    .send(ServerFrame::Control(
                                        serde_json::to_string(&ServerControl::Error {
                                            message: "slow_consumer".to_string(),
                                        })
                                        .unwrap_or_default(),
                                    ))
                                    .await;
                            }
                            break;
                        }
                    }
                }
            });
            joined.insert(channel_id, handle);
            state.bus.mark_joined(channel_id, user_id).await;
            state
                .bus
                .publish(channel_id, EventPayload::ParticipantJoined { user_id }, chrono::Utc::now())
                .await;
        }
        ClientControl::Unsubscribe { channel_id } => {
            if let Some(handle) = joined.remove(&channel_id) {
                handle.abort();
                state.bus.mark_left(channel_id, user_id).await;
                state
                    .bus
                    .publish(channel_id, EventPayload::ParticipantLeft { user_id }, chrono::Utc::now())
                    .await;
            }
        }
    }
}
