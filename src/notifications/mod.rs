//! Seller notifications: persistence, formatting, and delivery orchestration.

mod format;
mod models;
mod orchestrator;
pub mod replay;
mod store;

pub use format::{DefaultFormatter, Formatter};
pub use models::{
    DispatchResult, KindStats, Notification, NotificationKind, NotificationPayload,
    NotificationStats,
};
pub use orchestrator::{DeliveryOrchestrator, DispatchError, RealtimeChannel, RealtimeOutcome};
pub use store::{FullNotificationStore, NotificationStore, SqliteNotificationStore};
