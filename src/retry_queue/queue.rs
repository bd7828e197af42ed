use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use super::models::{JobPriority, QueueStats};
use super::policy::RetryPolicy;
use super::store::{InMemoryRetryQueueStore, RetryQueueStore, SqliteRetryQueueStore};

/// Facade over the retry queue backend. Opened once at startup; if the
/// durable backend fails to open the queue degrades to an in-memory one for
/// the lifetime of the process, announced by a single error log line.
#[derive(Clone)]
pub struct RetryQueue {
    store: Arc<dyn RetryQueueStore>,
    policy: RetryPolicy,
    durable: bool,
}

impl RetryQueue {
    pub fn open<T: AsRef<Path>>(db_path: T, policy: RetryPolicy) -> Self {
        match SqliteRetryQueueStore::new(&db_path) {
            Ok(store) => {
                info!("Retry queue backed by {:?}", db_path.as_ref());
                RetryQueue {
                    store: Arc::new(store),
                    policy,
                    durable: true,
                }
            }
            Err(e) => {
                error!(
                    "Failed to open retry queue database {:?}, falling back to \
                     in-memory queue, queued retries will not survive a restart: {}",
                    db_path.as_ref(),
                    e
                );
                RetryQueue {
                    store: Arc::new(InMemoryRetryQueueStore::new()),
                    policy,
                    durable: false,
                }
            }
        }
    }

    /// In-memory queue for tests.
    pub fn in_memory(policy: RetryPolicy) -> Self {
        RetryQueue {
            store: Arc::new(InMemoryRetryQueueStore::new()),
            policy,
            durable: false,
        }
    }

    /// Schedule the first redelivery of a notification, due after the base
    /// backoff. Re-scheduling a notification with a pending job replaces
    /// that job; an in-flight job is left to finish its attempt.
    pub fn schedule(
        &self,
        notification_id: i64,
        seller_id: &str,
        priority: JobPriority,
    ) -> Result<bool> {
        let next_retry_at = self.policy.next_retry_at(0);
        self.store
            .enqueue(notification_id, seller_id, priority, next_retry_at)
    }

    pub fn stats(&self) -> Result<QueueStats> {
        self.store.stats()
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn store(&self) -> Arc<dyn RetryQueueStore> {
        self.store.clone()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}
