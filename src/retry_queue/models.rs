use serde::{Deserialize, Serialize};

/// Lifecycle of a retry job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its next_retry_at to come due.
    Pending,
    /// Claimed by the worker, attempt in progress.
    InFlight,
    /// Redelivery succeeded.
    Done,
    /// Retries exhausted.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::InFlight => "IN_FLIGHT",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "IN_FLIGHT" => Some(JobStatus::InFlight),
            "DONE" => Some(JobStatus::Done),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::InFlight)
    }
}

/// Claim priority. High jobs are claimed before normal ones regardless of
/// how long the normal ones have been due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Normal,
    High,
}

impl JobPriority {
    pub fn as_i64(&self) -> i64 {
        match self {
            JobPriority::Normal => 0,
            JobPriority::High => 1,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        if value >= 1 {
            JobPriority::High
        } else {
            JobPriority::Normal
        }
    }
}

/// One queued redelivery. At most one active job exists per notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryJob {
    pub id: i64,
    pub notification_id: i64,
    pub seller_id: String,
    pub priority: JobPriority,
    pub status: JobStatus,
    pub retry_count: i32,
    pub next_retry_at: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Queue counters exposed over the status endpoint and metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub in_flight: u64,
    pub done: u64,
    pub failed: u64,
}
