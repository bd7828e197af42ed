//! Test data builders
//!
//! Payload builders for the notification kinds exercised by the tests.

use serde_json::{json, Value};
use vitrina_seller_server::notifications::{NotificationKind, NotificationStore};

/// A `new_order` dispatch payload as the order service would send it.
pub fn new_order_payload(order_id: &str) -> Value {
    json!({
        "kind": "new_order",
        "order_id": order_id,
        "buyer_name": "Test Buyer",
        "item_count": 2,
        "total_cents": 4500,
    })
}

/// A `system` dispatch payload.
pub fn system_payload(message: &str) -> Value {
    json!({
        "kind": "system",
        "message": message,
    })
}

/// Creates `count` notifications for a seller directly through the store,
/// bypassing delivery. Returns the created ids in ascending order.
pub fn seed_notifications(
    store: &dyn NotificationStore,
    seller_id: &str,
    count: usize,
) -> Vec<i64> {
    (0..count)
        .map(|i| {
            store
                .create(
                    seller_id,
                    NotificationKind::System,
                    &format!("Title {}", i),
                    &format!("Message {}", i),
                    &json!({"kind": "system", "message": format!("Message {}", i)}),
                    3,
                )
                .expect("Failed to seed notification")
                .id
        })
        .collect()
}
