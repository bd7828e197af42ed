//! Notification data models.

use serde::{Deserialize, Serialize};

/// Notification kind. Each kind has its own payload shape (see
/// [`NotificationPayload`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewOrder,
    OrderStatusUpdate,
    NewComment,
    CreditsUpdated,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewOrder => "new_order",
            NotificationKind::OrderStatusUpdate => "order_status_update",
            NotificationKind::NewComment => "new_comment",
            NotificationKind::CreditsUpdated => "credits_updated",
            NotificationKind::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "new_order" => Some(NotificationKind::NewOrder),
            "order_status_update" => Some(NotificationKind::OrderStatusUpdate),
            "new_comment" => Some(NotificationKind::NewComment),
            "credits_updated" => Some(NotificationKind::CreditsUpdated),
            "system" => Some(NotificationKind::System),
            _ => None,
        }
    }
}

/// Typed payload union, tagged by kind. Stored verbatim in the notification
/// row and carried verbatim to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationPayload {
    NewOrder {
        order_id: String,
        buyer_name: String,
        item_count: u32,
        total_cents: i64,
    },
    OrderStatusUpdate {
        order_id: String,
        status: String,
    },
    NewComment {
        stream_id: String,
        author_name: String,
        text: String,
    },
    CreditsUpdated {
        balance_cents: i64,
        delta_cents: i64,
    },
    System {
        message: String,
    },
}

impl NotificationPayload {
    /// The entity this notification is about, as `(entity, id)`, for kinds
    /// where connected clients should refresh a view.
    pub fn changed_entity(&self) -> Option<(&'static str, &str)> {
        match self {
            NotificationPayload::NewOrder { order_id, .. }
            | NotificationPayload::OrderStatusUpdate { order_id, .. } => {
                Some(("order", order_id))
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> NotificationKind {
        match self {
            NotificationPayload::NewOrder { .. } => NotificationKind::NewOrder,
            NotificationPayload::OrderStatusUpdate { .. } => NotificationKind::OrderStatusUpdate,
            NotificationPayload::NewComment { .. } => NotificationKind::NewComment,
            NotificationPayload::CreditsUpdated { .. } => NotificationKind::CreditsUpdated,
            NotificationPayload::System { .. } => NotificationKind::System,
        }
    }
}

/// A persisted seller notification.
///
/// `read` and `delivered` are independent axes: marking a notification read
/// does not stop delivery attempts, and delivery does not mark it read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Monotonically increasing within the store; used as the replay cursor.
    pub id: i64,
    pub seller_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
    pub read: bool,
    pub delivered: bool,
    pub delivered_at: Option<i64>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: i64,
}

/// Outcome of a dispatch, from the caller's perspective.
///
/// `Queued` is not a failure: the notification is durably recorded and a
/// retry job owns further delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchResult {
    Delivered,
    Queued,
}

/// Per-kind counters returned by `stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStats {
    pub total: u64,
    pub unread: u64,
    pub delivered: u64,
    /// Notifications whose retries were exhausted without a delivery.
    pub exhausted: u64,
}

/// Notification counts for one seller, broken down by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationStats {
    pub by_kind: Vec<(NotificationKind, KindStats)>,
}

impl NotificationStats {
    pub fn kind(&self, kind: NotificationKind) -> Option<&KindStats> {
        self.by_kind.iter().find(|(k, _)| *k == kind).map(|(_, s)| s)
    }

    pub fn total_unread(&self) -> u64 {
        self.by_kind.iter().map(|(_, s)| s.unread).sum()
    }
}
