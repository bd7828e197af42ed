//! Web push fallback channel.

mod models;
mod provider;
mod service;

pub use models::{PushError, PushOutcome, PushSubscription, SubscriptionStore};
pub use provider::{HttpPushProvider, PushMessage, PushProvider};
pub use service::PushService;
