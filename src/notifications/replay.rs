//! Reconnect replay.
//!
//! When a seller reconnects it reports the highest notification id it has
//! seen; everything created after that cursor is streamed back in order
//! before live traffic resumes. The cursor is just an id, so gaps left by
//! retention purges are harmless.

use anyhow::Result;

use super::models::Notification;
use super::store::NotificationStore;

/// Hard cap on a single replay, shields the socket from a seller that was
/// offline for months.
pub const MAX_REPLAY: usize = 500;

const PAGE_SIZE: usize = 100;

/// Collect all notifications a seller missed since `last_seen_id`, oldest
/// first, capped at [`MAX_REPLAY`].
pub fn collect_missed(
    store: &dyn NotificationStore,
    seller_id: &str,
    last_seen_id: i64,
) -> Result<Vec<Notification>> {
    let mut missed: Vec<Notification> = Vec::new();
    let mut cursor = last_seen_id;

    while missed.len() < MAX_REPLAY {
        let request = PAGE_SIZE.min(MAX_REPLAY - missed.len());
        let page = store.list_since(seller_id, cursor, request)?;
        let page_len = page.len();
        if let Some(last) = page.last() {
            cursor = last.id;
        }
        missed.extend(page);
        if page_len < request {
            break;
        }
    }

    Ok(missed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::models::NotificationKind;
    use crate::notifications::store::SqliteNotificationStore;

    fn create(store: &SqliteNotificationStore, seller: &str) -> i64 {
        store
            .create(
                seller,
                NotificationKind::NewComment,
                "New comment",
                "hi",
                &serde_json::json!({"kind": "new_comment", "stream_id": "st-1"}),
                3,
            )
            .unwrap()
            .id
    }

    #[test]
    fn replays_everything_after_cursor_in_order() {
        let store = SqliteNotificationStore::in_memory().unwrap();
        let ids: Vec<i64> = (0..5).map(|_| create(&store, "s1")).collect();

        let missed = collect_missed(&store, "s1", ids[1]).unwrap();

        assert_eq!(
            missed.iter().map(|n| n.id).collect::<Vec<_>>(),
            ids[2..].to_vec()
        );
    }

    #[test]
    fn cursor_zero_replays_all() {
        let store = SqliteNotificationStore::in_memory().unwrap();
        let ids: Vec<i64> = (0..3).map(|_| create(&store, "s1")).collect();
        create(&store, "s2");

        let missed = collect_missed(&store, "s1", 0).unwrap();
        assert_eq!(missed.len(), ids.len());
    }

    #[test]
    fn up_to_date_cursor_replays_nothing() {
        let store = SqliteNotificationStore::in_memory().unwrap();
        let last = (0..3).map(|_| create(&store, "s1")).last().unwrap();

        assert!(collect_missed(&store, "s1", last).unwrap().is_empty());
    }

    #[test]
    fn replay_spans_multiple_pages() {
        let store = SqliteNotificationStore::in_memory().unwrap();
        let count = PAGE_SIZE * 2 + 7;
        let ids: Vec<i64> = (0..count).map(|_| create(&store, "s1")).collect();

        let missed = collect_missed(&store, "s1", 0).unwrap();

        assert_eq!(missed.len(), count);
        assert_eq!(missed.first().unwrap().id, ids[0]);
        assert_eq!(missed.last().unwrap().id, *ids.last().unwrap());
    }

    #[test]
    fn replay_is_capped() {
        let store = SqliteNotificationStore::in_memory().unwrap();
        for _ in 0..(MAX_REPLAY + 20) {
            create(&store, "s1");
        }

        let missed = collect_missed(&store, "s1", 0).unwrap();
        assert_eq!(missed.len(), MAX_REPLAY);
    }

    #[test]
    fn replay_includes_delivered_and_read() {
        // The cursor decides what was missed, local flags do not
        let store = SqliteNotificationStore::in_memory().unwrap();
        let a = create(&store, "s1");
        store.mark_delivered(a).unwrap();
        store.mark_read("s1", Some(&[a])).unwrap();

        let missed = collect_missed(&store, "s1", 0).unwrap();
        assert_eq!(missed.len(), 1);
    }
}
