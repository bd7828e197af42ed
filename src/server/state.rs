use axum::extract::FromRef;

use crate::notifications::{DeliveryOrchestrator, FullNotificationStore};
use crate::retry_queue::RetryQueue;
use std::sync::Arc;
use std::time::Instant;

use super::websocket::ConnectionManager;
use super::ServerConfig;

pub type GuardedNotificationStore = Arc<dyn FullNotificationStore>;
pub type GuardedConnectionManager = Arc<ConnectionManager>;
pub type GuardedOrchestrator = Arc<DeliveryOrchestrator>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub notification_store: GuardedNotificationStore,
    pub ws_connection_manager: GuardedConnectionManager,
    pub orchestrator: GuardedOrchestrator,
    pub retry_queue: RetryQueue,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedNotificationStore {
    fn from_ref(input: &ServerState) -> Self {
        input.notification_store.clone()
    }
}

impl FromRef<ServerState> for GuardedConnectionManager {
    fn from_ref(input: &ServerState) -> Self {
        input.ws_connection_manager.clone()
    }
}

impl FromRef<ServerState> for GuardedOrchestrator {
    fn from_ref(input: &ServerState) -> Self {
        input.orchestrator.clone()
    }
}

impl FromRef<ServerState> for RetryQueue {
    fn from_ref(input: &ServerState) -> Self {
        input.retry_queue.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
