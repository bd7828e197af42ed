//! Durable retry queue for undelivered notifications.

mod models;
mod policy;
mod queue;
mod schema;
mod store;
mod worker;

pub use models::{JobPriority, JobStatus, QueueStats, RetryJob};
pub use policy::RetryPolicy;
pub use queue::RetryQueue;
pub use store::{InMemoryRetryQueueStore, RetryQueueStore, SqliteRetryQueueStore};
pub use worker::{AttemptOutcome, RetryHandler, RetryWorker};
