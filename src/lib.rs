//! Vitrina Seller Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod notifications;
pub mod push;
pub mod retry_queue;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use notifications::{
    DeliveryOrchestrator, Notification, NotificationKind, NotificationPayload,
    SqliteNotificationStore,
};
pub use retry_queue::{RetryPolicy, RetryQueue, RetryWorker};
pub use server::{run_server, RequestsLoggingLevel};
