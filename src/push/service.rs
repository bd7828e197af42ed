use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use super::models::{PushOutcome, SubscriptionStore};
use super::provider::{PushMessage, PushProvider};
use crate::notifications::Notification;

/// Push fallback: looks up the seller's subscription and hands the
/// notification to the provider. Subscriptions the provider reports as gone
/// are removed so later dispatches skip the push leg entirely.
pub struct PushService {
    store: Arc<dyn SubscriptionStore>,
    provider: Option<Arc<dyn PushProvider>>,
}

impl PushService {
    pub fn new(store: Arc<dyn SubscriptionStore>, provider: Arc<dyn PushProvider>) -> Self {
        Self {
            store,
            provider: Some(provider),
        }
    }

    /// Push fallback without a configured provider. Every send reports
    /// [`PushOutcome::Disabled`].
    pub fn disabled(store: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            store,
            provider: None,
        }
    }

    pub async fn send(&self, notification: &Notification) -> Result<PushOutcome> {
        let Some(provider) = &self.provider else {
            return Ok(PushOutcome::Disabled);
        };
        let Some(subscription) = self.store.get_subscription(&notification.seller_id)? else {
            return Ok(PushOutcome::NoSubscription);
        };

        let message = PushMessage {
            title: notification.title.clone(),
            body: notification.message.clone(),
            data: serde_json::json!({
                "notification_id": notification.id,
                "kind": notification.kind.as_str(),
            }),
        };

        match provider.send(&subscription, &message).await {
            Ok(()) => Ok(PushOutcome::Accepted),
            Err(e) if e.is_permanent() => {
                info!(
                    "Removing invalid push subscription for seller {}: {}",
                    notification.seller_id, e
                );
                self.store.remove_subscription(&notification.seller_id)?;
                Ok(PushOutcome::NoSubscription)
            }
            Err(e) => {
                warn!(
                    "Push attempt failed for notification {} (seller {}): {}",
                    notification.id, notification.seller_id, e
                );
                Ok(PushOutcome::Failed)
            }
        }
    }
}
