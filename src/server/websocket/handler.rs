//! WebSocket route handler.
//!
//! Handles the upgrade, reconnect replay, the ack/ping message loop, and
//! cleanup on disconnect.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::{
    connection::ConnectionManager,
    messages::{msg_types, system, ClientMessage, ServerMessage},
};
use crate::notifications::{replay, NotificationStore};
use crate::server::metrics;
use crate::server::state::{GuardedConnectionManager, GuardedNotificationStore};

struct WsState {
    connection_manager: Arc<ConnectionManager>,
    notification_store: GuardedNotificationStore,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    session_id: String,
    /// Highest notification id the client has seen; everything after it is
    /// replayed before live traffic.
    last_seen_id: Option<i64>,
}

/// WebSocket upgrade handler for `GET /v1/ws/{seller_id}`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(seller_id): Path<String>,
    Query(query): Query<WsQuery>,
    State(connection_manager): State<GuardedConnectionManager>,
    State(notification_store): State<GuardedNotificationStore>,
) -> Response {
    let state = Arc::new(WsState {
        connection_manager,
        notification_store,
    });

    debug!(
        "WebSocket upgrade for seller {} session {} (last_seen_id: {:?})",
        seller_id, query.session_id, query.last_seen_id
    );

    ws.on_upgrade(move |socket| {
        handle_socket(
            socket,
            seller_id,
            query.session_id,
            query.last_seen_id,
            state,
        )
    })
}

async fn handle_socket(
    socket: WebSocket,
    seller_id: String,
    session_id: String,
    last_seen_id: Option<i64>,
    state: Arc<WsState>,
) {
    debug!(
        "WebSocket connected: seller {} session {}",
        seller_id, session_id
    );

    let outgoing_rx = state
        .connection_manager
        .register(&seller_id, &session_id)
        .await;
    metrics::set_ws_connections(state.connection_manager.total_connections().await);

    let (ws_sink, ws_stream) = socket.split();

    let connected_msg = ServerMessage::new(
        msg_types::CONNECTED,
        system::Connected {
            session_id: session_id.clone(),
            server_version: format!("{}-{}", env!("APP_VERSION"), env!("GIT_HASH")),
        },
    );

    let outgoing_handle = tokio::spawn(forward_outgoing(ws_sink, outgoing_rx, connected_msg));

    // Replay runs through the same outgoing queue so the connected message
    // arrives first and live traffic lands after the backlog.
    if let Some(last_seen_id) = last_seen_id {
        replay_missed(&seller_id, &session_id, last_seen_id, &state).await;
    }

    process_incoming(ws_stream, &seller_id, &session_id, &state).await;

    debug!(
        "WebSocket disconnected: seller {} session {}",
        seller_id, session_id
    );
    outgoing_handle.abort();

    state
        .connection_manager
        .unregister(&seller_id, &session_id)
        .await;
    metrics::set_ws_connections(state.connection_manager.total_connections().await);
}

async fn replay_missed(seller_id: &str, session_id: &str, last_seen_id: i64, state: &WsState) {
    let missed =
        match replay::collect_missed(&*state.notification_store, seller_id, last_seen_id) {
            Ok(missed) => missed,
            Err(e) => {
                error!("Replay failed for seller {}: {}", seller_id, e);
                return;
            }
        };

    let replayed = missed.len();
    for notification in missed {
        let msg = ServerMessage::new(msg_types::NOTIFICATION, &notification);
        if state
            .connection_manager
            .send_to_session(seller_id, session_id, msg)
            .await
            .is_err()
        {
            return;
        }
    }

    debug!(
        "Replayed {} notifications to seller {} session {}",
        replayed, seller_id, session_id
    );
    let _ = state
        .connection_manager
        .send_to_session(
            seller_id,
            session_id,
            ServerMessage::new(msg_types::REPLAY_COMPLETE, system::ReplayComplete { replayed }),
        )
        .await;
}

/// Forward messages from the outgoing channel to the WebSocket.
async fn forward_outgoing(
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outgoing_rx: mpsc::Receiver<ServerMessage>,
    initial_msg: ServerMessage,
) {
    if let Ok(json) = serde_json::to_string(&initial_msg) {
        if ws_sink.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    while let Some(msg) = outgoing_rx.recv().await {
        match serde_json::to_string(&msg) {
            Ok(json) => {
                if ws_sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to serialize WebSocket message: {}", e);
            }
        }
    }
}

/// Process incoming messages from the WebSocket.
async fn process_incoming(
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    seller_id: &str,
    session_id: &str,
    state: &WsState,
) {
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => {
                    handle_client_message(seller_id, session_id, msg, state).await;
                }
                Err(e) => {
                    debug!("Failed to parse client message: {}", e);
                    let error_msg = ServerMessage::new(
                        msg_types::ERROR,
                        system::Error::new(
                            "parse_error",
                            format!("Invalid message format: {}", e),
                        ),
                    );
                    let _ = state
                        .connection_manager
                        .send_to_session(seller_id, session_id, error_msg)
                        .await;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(
                    "WebSocket error for seller {} session {}: {}",
                    seller_id, session_id, e
                );
                break;
            }
        }
    }
}

async fn handle_client_message(
    seller_id: &str,
    session_id: &str,
    msg: ClientMessage,
    state: &WsState,
) {
    match msg.msg_type.as_str() {
        msg_types::PING => {
            let _ = state
                .connection_manager
                .send_to_session(seller_id, session_id, ServerMessage::empty(msg_types::PONG))
                .await;
        }
        msg_types::ACK => {
            let ack: system::Ack = match serde_json::from_value(msg.payload) {
                Ok(ack) => ack,
                Err(e) => {
                    debug!("Invalid ack payload from seller {}: {}", seller_id, e);
                    return;
                }
            };
            handle_ack(seller_id, ack.notification_id, state).await;
        }
        msg_types::REPLAY_REQUEST => {
            let request: system::ReplayRequest = match serde_json::from_value(msg.payload) {
                Ok(request) => request,
                Err(e) => {
                    debug!("Invalid replay request from seller {}: {}", seller_id, e);
                    return;
                }
            };
            replay_missed(seller_id, session_id, request.last_seen_id, state).await;
        }
        other => {
            debug!("Unknown message type '{}' from seller {}", other, seller_id);
            let error_msg = ServerMessage::new(
                msg_types::ERROR,
                system::Error::new("unknown_type", format!("Unknown message type: {}", other)),
            );
            let _ = state
                .connection_manager
                .send_to_session(seller_id, session_id, error_msg)
                .await;
        }
    }
}

/// An ack resolves one waiting delivery attempt if any, and always marks the
/// notification delivered. Replayed notifications have no waiting attempt.
async fn handle_ack(seller_id: &str, notification_id: i64, state: &WsState) {
    // The ack must come from the notification's owner
    match state.notification_store.get(notification_id) {
        Ok(Some(n)) if n.seller_id == seller_id => {}
        Ok(_) => {
            warn!(
                "Ignoring ack from seller {} for foreign or unknown notification {}",
                seller_id, notification_id
            );
            return;
        }
        Err(e) => {
            error!("Failed to look up notification {}: {}", notification_id, e);
            return;
        }
    }

    state.connection_manager.resolve_ack(notification_id);
    if let Err(e) = state.notification_store.mark_delivered(notification_id) {
        error!(
            "Failed to mark notification {} delivered on ack: {}",
            notification_id, e
        );
    }
}
