//! WebSocket connection manager.
//!
//! Tracks active connections per seller and correlates notification
//! acknowledgments with in-flight delivery attempts.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::debug;

use super::messages::{msg_types, system, ServerMessage};
use crate::notifications::{Notification, RealtimeChannel, RealtimeOutcome};

/// Error type for send operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SendError {
    /// The target session is not connected.
    NotConnected,
    /// The connection channel is closed (session disconnected).
    Disconnected,
}

struct ConnectionEntry {
    sender: mpsc::Sender<ServerMessage>,
}

/// Manages all active WebSocket connections.
///
/// Connections are organized by seller_id, then by session_id, so a seller
/// with multiple open tabs or devices gets every notification on each.
pub struct ConnectionManager {
    /// seller_id -> (session_id -> connection entry)
    connections: RwLock<HashMap<String, HashMap<String, ConnectionEntry>>>,
    /// Pending ack waiters keyed by notification id. First ack wins; later
    /// acks for the same notification find no waiter and only touch the
    /// delivered flag in the store.
    pending_acks: StdMutex<HashMap<i64, oneshot::Sender<()>>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            pending_acks: StdMutex::new(HashMap::new()),
        }
    }

    /// Register a new connection. Returns a receiver the socket task must
    /// drain into the WebSocket. Reconnecting with an existing session_id
    /// drops the old sender (drop-and-replace).
    pub async fn register(
        &self,
        seller_id: &str,
        session_id: &str,
    ) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(32);

        let mut conns = self.connections.write().await;
        let seller_conns = conns.entry(seller_id.to_string()).or_default();
        seller_conns.insert(session_id.to_string(), ConnectionEntry { sender: tx });

        rx
    }

    /// Unregister a connection and clean up empty seller maps.
    pub async fn unregister(&self, seller_id: &str, session_id: &str) {
        let mut conns = self.connections.write().await;
        if let Some(seller_conns) = conns.get_mut(seller_id) {
            seller_conns.remove(session_id);
            if seller_conns.is_empty() {
                conns.remove(seller_id);
            }
        }
    }

    /// Send a message to a specific session.
    pub async fn send_to_session(
        &self,
        seller_id: &str,
        session_id: &str,
        message: ServerMessage,
    ) -> Result<(), SendError> {
        let conns = self.connections.read().await;
        if let Some(seller_conns) = conns.get(seller_id) {
            if let Some(entry) = seller_conns.get(session_id) {
                entry
                    .sender
                    .send(message)
                    .await
                    .map_err(|_| SendError::Disconnected)?;
                return Ok(());
            }
        }
        Err(SendError::NotConnected)
    }

    /// Send a message to all sessions of a seller.
    ///
    /// Returns the number of sessions the message was handed to.
    pub async fn broadcast_to_seller(&self, seller_id: &str, message: ServerMessage) -> usize {
        let conns = self.connections.read().await;
        let mut sent = 0;

        if let Some(seller_conns) = conns.get(seller_id) {
            for entry in seller_conns.values() {
                if entry.sender.send(message.clone()).await.is_ok() {
                    sent += 1;
                }
            }
        }

        sent
    }

    /// Deliver a notification over the realtime channel and wait for an ack.
    ///
    /// The waiter is registered before the broadcast so an ack racing the
    /// send cannot be lost.
    pub async fn send_notification(
        &self,
        notification: &Notification,
        ack_timeout: Duration,
    ) -> RealtimeOutcome {
        if !self.is_seller_connected(&notification.seller_id).await {
            return RealtimeOutcome::NoConnection;
        }

        let (tx, rx) = oneshot::channel();
        self.pending_acks
            .lock()
            .unwrap()
            .insert(notification.id, tx);

        let message = ServerMessage::new(msg_types::NOTIFICATION, notification);
        let sent = self
            .broadcast_to_seller(&notification.seller_id, message)
            .await;

        if sent == 0 {
            self.pending_acks.lock().unwrap().remove(&notification.id);
            return RealtimeOutcome::NoConnection;
        }

        let outcome = match tokio::time::timeout(ack_timeout, rx).await {
            Ok(Ok(())) => RealtimeOutcome::Acked,
            // Elapsed, or the waiter was dropped without an ack
            _ => RealtimeOutcome::AckTimeout,
        };
        self.pending_acks.lock().unwrap().remove(&notification.id);
        outcome
    }

    /// Resolve a pending ack waiter. Returns false when no attempt was
    /// waiting, which is the normal case for replayed notifications.
    pub fn resolve_ack(&self, notification_id: i64) -> bool {
        let waiter = self.pending_acks.lock().unwrap().remove(&notification_id);
        match waiter {
            Some(tx) => {
                debug!("Ack received for notification {}", notification_id);
                tx.send(()).is_ok()
            }
            None => false,
        }
    }

    pub async fn is_seller_connected(&self, seller_id: &str) -> bool {
        let conns = self.connections.read().await;
        conns
            .get(seller_id)
            .map(|seller_conns| !seller_conns.is_empty())
            .unwrap_or(false)
    }

    /// Session ids currently open for a seller.
    pub async fn get_connected_sessions(&self, seller_id: &str) -> Vec<String> {
        let conns = self.connections.read().await;
        conns
            .get(seller_id)
            .map(|seller_conns| seller_conns.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of active connections across all sellers.
    pub async fn total_connections(&self) -> usize {
        let conns = self.connections.read().await;
        conns.values().map(|seller_conns| seller_conns.len()).sum()
    }

    pub async fn connected_seller_count(&self) -> usize {
        let conns = self.connections.read().await;
        conns.len()
    }
}

#[async_trait]
impl RealtimeChannel for ConnectionManager {
    async fn deliver(&self, notification: &Notification, ack_timeout: Duration) -> RealtimeOutcome {
        self.send_notification(notification, ack_timeout).await
    }

    async fn announce_entity_changed(&self, seller_id: &str, entity: &str, entity_id: &str) {
        let message = ServerMessage::new(
            msg_types::ENTITY_CHANGED,
            system::EntityChanged {
                entity: entity.to_string(),
                id: entity_id.to_string(),
            },
        );
        self.broadcast_to_seller(seller_id, message).await;
    }
}
