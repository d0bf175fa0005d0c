//! WebSocket transport boundary
//!
//! Owns a connection's lifecycle: writer pump, identity attachment, room
//! join/leave, feeding chat events through the pipeline, and teardown on
//! disconnect. Every inbound event is handled on this connection's task;
//! concurrent connections run the pipeline concurrently.

use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

use crate::core::broadcast::{BroadcastFabric, ConnectionSender};
use crate::core::events::{codes, ClientEvent, ServerEvent};
use crate::core::pipeline::{MessagePipeline, PipelineOutcome, SocketIdentity};
use crate::metrics::MetricsCollector;

/// Shared state handed to every connection handler.
pub struct AppState {
    pub pipeline: Arc<MessagePipeline>,
    pub fabric: Arc<BroadcastFabric>,
    pub metrics: Arc<dyn MetricsCollector>,
    pub connections: AtomicI64,
}

pub type SharedState = Arc<AppState>;

/// Build the connection identity from upgrade-time query parameters.
/// Absent or incomplete credentials leave the socket unauthenticated; the
/// pipeline rejects its messages with `SESSION_EXPIRED`.
pub fn identity_from_query(
    query: &HashMap<String, String>,
    socket_id: &str,
) -> Option<SocketIdentity> {
    let user_id = query.get("user_id")?;
    let session_id = query.get("session_id")?;

    Some(SocketIdentity {
        user_id: user_id.clone(),
        auth_session_id: session_id.clone(),
        socket_id: socket_id.to_string(),
    })
}

/// Handle one WebSocket connection for its whole lifetime.
pub async fn handle_ws_client(
    ws: WebSocket,
    identity: Option<SocketIdentity>,
    state: SharedState,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Writer pump: everything addressed to this connection funnels through
    // the channel, whether it came from the fabric or this handler.
    tokio::task::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if let Err(e) = ws_tx.send(Message::text(payload)).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let socket_id = identity
        .as_ref()
        .map(|i| i.socket_id.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(
        "Client connected: socket={}, authenticated={}",
        socket_id,
        identity.is_some()
    );
    record_connection_gauge(&state, 1).await;

    send_event(
        &tx,
        &ServerEvent::Connected {
            socket_id: socket_id.clone(),
            authenticated: identity.is_some(),
        },
    );

    while let Some(result) = ws_rx.next().await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                error!("WebSocket error on {}: {}", socket_id, e);
                break;
            }
        };

        if !message.is_text() {
            continue;
        }
        let text = match message.to_str() {
            Ok(text) => text,
            Err(_) => continue,
        };

        let event: ClientEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                warn!("Failed to parse client event from {}: {}", socket_id, e);
                send_event(
                    &tx,
                    &ServerEvent::error(codes::MESSAGE_ERROR, "unrecognized event"),
                );
                continue;
            }
        };

        handle_client_event(event, identity.as_ref(), &socket_id, &tx, &state).await;
    }

    // Teardown: a disconnect mid-pipeline does not abort an in-progress
    // save or broadcast; only the subscriptions go.
    if let Some(identity) = identity.as_ref() {
        let left = state
            .pipeline
            .membership()
            .leave_all(&identity.user_id)
            .await;
        debug!("user {} left {} rooms on disconnect", identity.user_id, left.len());
    }
    state.fabric.unsubscribe_all(&socket_id).await;
    record_connection_gauge(&state, -1).await;

    info!("Client disconnected: socket={}", socket_id);
}

async fn handle_client_event(
    event: ClientEvent,
    identity: Option<&SocketIdentity>,
    socket_id: &str,
    tx: &ConnectionSender,
    state: &SharedState,
) {
    match event {
        ClientEvent::ChatMessage { data } => {
            match state.pipeline.process(identity, data).await {
                PipelineOutcome::Rejected { event, .. } => {
                    // Errors go to the originating connection only.
                    send_event(tx, &event);
                }
                PipelineOutcome::Ignored => {}
                PipelineOutcome::Persisted(_) => {
                    // Delivery already happened through the fabric,
                    // including to this sender's own subscription.
                }
            }
        }

        ClientEvent::JoinRoom { room } => {
            let identity = match identity {
                Some(identity) => identity,
                None => {
                    send_event(
                        tx,
                        &ServerEvent::error(codes::SESSION_EXPIRED, "sign in to join rooms"),
                    );
                    return;
                }
            };

            state.pipeline.membership().join(&identity.user_id, &room).await;
            match state.fabric.subscribe(&room, socket_id, tx.clone()).await {
                Ok(()) => {
                    debug!("user {} joined room {}", identity.user_id, room);
                    send_event(tx, &ServerEvent::Joined { room });
                }
                Err(e) => {
                    error!("failed to subscribe {} to room {}: {}", socket_id, room, e);
                    state.pipeline.membership().leave(&identity.user_id, &room).await;
                    send_event(
                        tx,
                        &ServerEvent::error(codes::MESSAGE_ERROR, "failed to join room"),
                    );
                }
            }
        }

        ClientEvent::LeaveRoom { room } => {
            if let Some(identity) = identity {
                state.pipeline.membership().leave(&identity.user_id, &room).await;
            }
            state.fabric.unsubscribe(&room, socket_id).await;
            send_event(tx, &ServerEvent::Left { room });
        }
    }
}

fn send_event(tx: &ConnectionSender, event: &ServerEvent) {
    match serde_json::to_string(event) {
        Ok(payload) => {
            if tx.send(payload).is_err() {
                debug!("connection closed before event could be sent");
            }
        }
        Err(e) => error!("Failed to serialize server event: {}", e),
    }
}

async fn record_connection_gauge(state: &SharedState, delta: i64) {
    // Gauge maintenance is observability only; failures are logged and
    // otherwise ignored.
    let count = state.connections.fetch_add(delta, Ordering::Relaxed) + delta;
    if let Err(e) = state
        .metrics
        .set_gauge("active_connections", count.max(0) as f64, HashMap::new())
        .await
    {
        debug!("failed to update connection gauge: {}", e);
    }
}
