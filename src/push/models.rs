use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A seller's web push subscription as handed out by the browser's push
/// manager. One subscription per seller, last write wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushSubscription {
    #[serde(default)]
    pub seller_id: String,
    pub endpoint: String,
    pub p256dh_key: String,
    pub auth_key: String,
}

/// Persistence for push subscriptions.
pub trait SubscriptionStore: Send + Sync {
    /// Insert or replace the seller's subscription.
    fn upsert_subscription(&self, subscription: &PushSubscription) -> Result<()>;

    fn get_subscription(&self, seller_id: &str) -> Result<Option<PushSubscription>>;

    /// Returns true if a subscription existed and was removed.
    fn remove_subscription(&self, seller_id: &str) -> Result<bool>;
}

/// Errors from the push provider, split by whether the subscription is
/// still worth keeping.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The provider said the subscription no longer exists (HTTP 404/410).
    /// The subscription must be dropped, not retried.
    #[error("Push subscription is gone")]
    SubscriptionGone,

    /// The provider rejected the request for this attempt only.
    #[error("Push provider rejected request with status {0}")]
    Rejected(u16),

    /// The provider could not be reached at all.
    #[error("Push provider unreachable: {0}")]
    Unreachable(String),
}

impl PushError {
    /// Permanent errors invalidate the subscription itself rather than the
    /// single attempt.
    pub fn is_permanent(&self) -> bool {
        matches!(self, PushError::SubscriptionGone)
    }
}

/// Outcome of a push attempt, as seen by the dispatch flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The provider accepted the message. Acceptance is not a delivery
    /// acknowledgment from the device.
    Accepted,
    /// The seller has no subscription on file.
    NoSubscription,
    /// The attempt failed and may be retried.
    Failed,
    /// No push provider is configured, nothing was attempted.
    Disabled,
}
