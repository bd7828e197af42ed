//! Delivery orchestration.
//!
//! Every dispatch persists the notification first, then walks the delivery
//! chain: realtime with an ack wait, push fallback, retry queue. A realtime
//! ack and an accepted push send both end the chain as delivered; only when
//! neither channel takes the message does a retry job get scheduled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::format::Formatter;
use super::models::{DispatchResult, Notification, NotificationKind, NotificationPayload};
use super::store::NotificationStore;
use crate::push::{PushOutcome, PushService};
use crate::retry_queue::{AttemptOutcome, JobPriority, RetryHandler, RetryJob, RetryQueue};
use crate::server::metrics;

/// Result of a realtime delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeOutcome {
    /// A connected session acknowledged receipt.
    Acked,
    /// No open session, the attempt was skipped.
    NoConnection,
    /// Sessions were open but none acknowledged within the timeout.
    AckTimeout,
}

/// Realtime delivery seam. Implemented by the WebSocket connection manager;
/// tests substitute fakes.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn deliver(&self, notification: &Notification, ack_timeout: Duration) -> RealtimeOutcome;

    /// Fire-and-forget broadcast telling the seller's open sessions that an
    /// entity changed, sent after an acked delivery so views can refresh.
    /// Never acked, never retried.
    async fn announce_entity_changed(&self, seller_id: &str, entity: &str, entity_id: &str) {
        let _ = (seller_id, entity, entity_id);
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The notification could not be persisted. Nothing was attempted.
    #[error("Failed to store notification: {0}")]
    Store(#[source] anyhow::Error),

    /// The notification is stored but could not be scheduled for retry.
    #[error("Failed to queue notification {notification_id} for retry: {source}")]
    Queue {
        notification_id: i64,
        #[source]
        source: anyhow::Error,
    },
}

/// New orders are claimed ahead of everything else waiting in the queue.
fn job_priority(kind: NotificationKind) -> JobPriority {
    match kind {
        NotificationKind::NewOrder => JobPriority::High,
        _ => JobPriority::Normal,
    }
}

pub struct DeliveryOrchestrator {
    store: Arc<dyn NotificationStore>,
    realtime: Arc<dyn RealtimeChannel>,
    push: Arc<PushService>,
    queue: RetryQueue,
    formatter: Arc<dyn Formatter>,
    ack_timeout: Duration,
    max_retries: i32,
}

impl DeliveryOrchestrator {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        realtime: Arc<dyn RealtimeChannel>,
        push: Arc<PushService>,
        queue: RetryQueue,
        formatter: Arc<dyn Formatter>,
        ack_timeout: Duration,
        max_retries: i32,
    ) -> Self {
        Self {
            store,
            realtime,
            push,
            queue,
            formatter,
            ack_timeout,
            max_retries,
        }
    }

    /// Dispatch a notification to a seller.
    ///
    /// The write to the store happens before any delivery attempt, so once
    /// this returns the notification is queryable whatever the channels did.
    pub async fn dispatch(
        &self,
        seller_id: &str,
        payload: NotificationPayload,
    ) -> Result<(Notification, DispatchResult), DispatchError> {
        let (title, message) = self.formatter.render(&payload);
        let kind = payload.kind();
        let payload_value = serde_json::to_value(&payload)
            .map_err(|e| DispatchError::Store(anyhow::Error::new(e)))?;

        let notification = self
            .store
            .create(seller_id, kind, &title, &message, &payload_value, self.max_retries)
            .map_err(DispatchError::Store)?;

        debug!(
            "Dispatching notification {} ({}) to seller {}",
            notification.id,
            kind.as_str(),
            seller_id
        );

        match self.realtime.deliver(&notification, self.ack_timeout).await {
            RealtimeOutcome::Acked => {
                if let Err(e) = self.store.mark_delivered(notification.id) {
                    error!(
                        "Notification {} acked but not marked delivered: {}",
                        notification.id, e
                    );
                }
                if let Some((entity, entity_id)) = payload.changed_entity() {
                    self.realtime
                        .announce_entity_changed(seller_id, entity, entity_id)
                        .await;
                }
                metrics::observe_dispatch("realtime", kind.as_str());
                return Ok((notification, DispatchResult::Delivered));
            }
            RealtimeOutcome::NoConnection => {
                debug!(
                    "Seller {} not connected, falling back to push for notification {}",
                    seller_id, notification.id
                );
            }
            RealtimeOutcome::AckTimeout => {
                info!(
                    "No ack for notification {} within {:?}, falling back to push",
                    notification.id, self.ack_timeout
                );
            }
        }

        // Provider acceptance is an optimistic terminal state: there is no
        // client ack for push, so an accepted send counts as delivered and
        // nothing is queued.
        match self.push.send(&notification).await {
            Ok(PushOutcome::Accepted) => {
                if let Err(e) = self.store.mark_delivered(notification.id) {
                    error!(
                        "Notification {} pushed but not marked delivered: {}",
                        notification.id, e
                    );
                }
                metrics::observe_push(PushOutcome::Accepted);
                metrics::observe_dispatch("push", kind.as_str());
                return Ok((notification, DispatchResult::Delivered));
            }
            Ok(outcome) => metrics::observe_push(outcome),
            Err(e) => warn!(
                "Push fallback errored for notification {}: {}",
                notification.id, e
            ),
        }

        self.queue
            .schedule(notification.id, seller_id, job_priority(kind))
            .map_err(|source| DispatchError::Queue {
                notification_id: notification.id,
                source,
            })?;
        metrics::observe_dispatch("queued", kind.as_str());

        Ok((notification, DispatchResult::Queued))
    }
}

#[async_trait]
impl RetryHandler for DeliveryOrchestrator {
    async fn attempt(&self, job: &RetryJob) -> AttemptOutcome {
        let notification = match self.store.get(job.notification_id) {
            Ok(Some(n)) => n,
            Ok(None) => {
                // Purged since it was queued, nothing left to deliver
                return AttemptOutcome::Delivered;
            }
            Err(e) => return AttemptOutcome::Failed(format!("store error: {}", e)),
        };

        if notification.delivered {
            // Acked through replay or a parallel attempt while queued
            return AttemptOutcome::Delivered;
        }

        match self.realtime.deliver(&notification, self.ack_timeout).await {
            RealtimeOutcome::Acked => {
                if let Err(e) = self.store.mark_delivered(notification.id) {
                    return AttemptOutcome::Failed(format!("mark delivered: {}", e));
                }
                AttemptOutcome::Delivered
            }
            // Retries go through the realtime channel only; the push leg
            // already ran once at dispatch time, and only reconnecting
            // sessions change the picture between attempts.
            RealtimeOutcome::NoConnection => {
                AttemptOutcome::Failed("seller not connected".to_string())
            }
            RealtimeOutcome::AckTimeout => {
                AttemptOutcome::Failed("no ack within timeout".to_string())
            }
        }
    }

    fn on_retry_scheduled(&self, notification_id: i64, retry_count: i32) {
        if let Err(e) = self.store.set_retry_count(notification_id, retry_count) {
            error!(
                "Failed to record retry count for notification {}: {}",
                notification_id, e
            );
        }
    }

    fn on_exhausted(&self, notification_id: i64, attempts: i32) {
        if let Err(e) = self.store.mark_retry_exhausted(notification_id, attempts) {
            error!(
                "Failed to mark notification {} exhausted: {}",
                notification_id, e
            );
        }
    }
}
