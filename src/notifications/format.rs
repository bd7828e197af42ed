//! Title/message rendering for notifications.
//!
//! Rendering happens once at dispatch time; the rendered strings are stored
//! alongside the raw payload so clients never re-derive them.

use super::models::NotificationPayload;

/// Renders a human-readable title and message from a payload.
pub trait Formatter: Send + Sync {
    fn render(&self, payload: &NotificationPayload) -> (String, String);
}

/// Default English renderer.
pub struct DefaultFormatter;

impl Formatter for DefaultFormatter {
    fn render(&self, payload: &NotificationPayload) -> (String, String) {
        match payload {
            NotificationPayload::NewOrder {
                order_id,
                buyer_name,
                item_count,
                total_cents,
            } => (
                "New order".to_string(),
                format!(
                    "{} placed order {} ({} items, {})",
                    buyer_name,
                    order_id,
                    item_count,
                    format_cents(*total_cents)
                ),
            ),
            NotificationPayload::OrderStatusUpdate { order_id, status } => (
                "Order updated".to_string(),
                format!("Order {} is now {}", order_id, status),
            ),
            NotificationPayload::NewComment {
                author_name, text, ..
            } => (
                "New comment".to_string(),
                format!("{}: {}", author_name, truncate(text, 120)),
            ),
            NotificationPayload::CreditsUpdated {
                balance_cents,
                delta_cents,
            } => (
                "Credits updated".to_string(),
                format!(
                    "Balance changed by {} to {}",
                    format_cents(*delta_cents),
                    format_cents(*balance_cents)
                ),
            ),
            NotificationPayload::System { message } => {
                ("System".to_string(), message.clone())
            }
        }
    }
}

fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_order_render() {
        let (title, message) = DefaultFormatter.render(&NotificationPayload::NewOrder {
            order_id: "ord-42".to_string(),
            buyer_name: "Ada".to_string(),
            item_count: 3,
            total_cents: 1999,
        });
        assert_eq!(title, "New order");
        assert_eq!(message, "Ada placed order ord-42 (3 items, 19.99)");
    }

    #[test]
    fn credits_render_handles_negative_delta() {
        let (_, message) = DefaultFormatter.render(&NotificationPayload::CreditsUpdated {
            balance_cents: 500,
            delta_cents: -250,
        });
        assert_eq!(message, "Balance changed by -2.50 to 5.00");
    }

    #[test]
    fn long_comment_is_truncated() {
        let text = "x".repeat(500);
        let (_, message) = DefaultFormatter.render(&NotificationPayload::NewComment {
            stream_id: "s1".to_string(),
            author_name: "Bob".to_string(),
            text,
        });
        // "Bob: " + 120 chars + ellipsis
        assert!(message.chars().count() <= 5 + 120 + 1);
        assert!(message.ends_with('…'));
    }

    #[test]
    fn system_render_passes_message_through() {
        let (title, message) = DefaultFormatter.render(&NotificationPayload::System {
            message: "maintenance at 02:00".to_string(),
        });
        assert_eq!(title, "System");
        assert_eq!(message, "maintenance at 02:00");
    }
}
