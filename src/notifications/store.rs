//! Notification persistence.
//!
//! The store is the source of truth for every notification ever created:
//! dispatch always writes here before any delivery attempt, and replay,
//! unread queries, and stats all read from here regardless of what the
//! delivery channels did.

use super::models::{KindStats, Notification, NotificationKind, NotificationStats};
use crate::push::{PushSubscription, SubscriptionStore};
use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, SqlType, Table, VersionedSchema, BASE_DB_VERSION, DEFAULT_TIMESTAMP,
};
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// V 0
const NOTIFICATION_TABLE_V_0: Table = Table {
    name: "notification",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            autoincrement = true
        ),
        sqlite_column!("seller_id", &SqlType::Text, non_null = true),
        sqlite_column!("kind", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("message", &SqlType::Text, non_null = true),
        sqlite_column!("payload", &SqlType::Text, non_null = true),
        sqlite_column!("read", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!(
            "delivered",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("delivered_at", &SqlType::Integer),
        sqlite_column!(
            "retry_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("max_retries", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[
        ("idx_notification_seller", "seller_id"),
        ("idx_notification_created", "created_at"),
    ],
};

const PUSH_SUBSCRIPTION_TABLE_V_0: Table = Table {
    name: "push_subscription",
    columns: &[
        sqlite_column!(
            "seller_id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("endpoint", &SqlType::Text, non_null = true),
        sqlite_column!("p256dh_key", &SqlType::Text, non_null = true),
        sqlite_column!("auth_key", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[],
};

const VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[NOTIFICATION_TABLE_V_0, PUSH_SUBSCRIPTION_TABLE_V_0],
    migration: None,
}];

/// Durable record of every notification ever created.
pub trait NotificationStore: Send + Sync {
    /// Persist a new notification. This is always the first write of a
    /// dispatch; failure here aborts the dispatch.
    fn create(
        &self,
        seller_id: &str,
        kind: NotificationKind,
        title: &str,
        message: &str,
        payload: &serde_json::Value,
        max_retries: i32,
    ) -> Result<Notification>;

    /// Returns Ok(None) if the notification does not exist.
    fn get(&self, id: i64) -> Result<Option<Notification>>;

    /// Mark a notification delivered. Idempotent: a second call keeps the
    /// original delivered_at.
    fn mark_delivered(&self, id: i64) -> Result<()>;

    /// Record the retry count observed by the queue worker.
    fn set_retry_count(&self, id: i64, retry_count: i32) -> Result<()>;

    /// Terminal, idempotent: records that retries were exhausted after
    /// `attempts` failed attempts. The row stays visible through queries.
    fn mark_retry_exhausted(&self, id: i64, attempts: i32) -> Result<()>;

    /// Mark notifications read. With `ids = None`, marks all of the seller's
    /// notifications. Returns the number of rows newly marked.
    fn mark_read(&self, seller_id: &str, ids: Option<&[i64]>) -> Result<usize>;

    /// Notifications with `id > after_id`, ascending by id, at most `limit`.
    fn list_since(&self, seller_id: &str, after_id: i64, limit: usize) -> Result<Vec<Notification>>;

    /// Unread notifications, ascending by id, at most `limit`.
    fn list_unread(&self, seller_id: &str, limit: usize) -> Result<Vec<Notification>>;

    /// Counts by kind, split by read/delivered/exhausted.
    fn stats(&self, seller_id: &str) -> Result<NotificationStats>;

    /// Retention: delete notifications older than `max_age_secs`. With
    /// `only_read`, unread notifications are kept regardless of age.
    /// Returns the number of rows purged.
    fn purge_older_than(&self, max_age_secs: i64, only_read: bool) -> Result<usize>;
}

/// Everything the server needs from the notifications database.
pub trait FullNotificationStore: NotificationStore + SubscriptionStore {}
impl<T: NotificationStore + SubscriptionStore> FullNotificationStore for T {}

#[derive(Clone)]
pub struct SqliteNotificationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteNotificationStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                &db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(&db_path)?;
            VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created notifications database at {:?}", db_path.as_ref());
            conn
        };

        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;

        if db_version < 0 {
            bail!(
                "Notifications database version {} is too old, missing base version {}",
                db_version,
                BASE_DB_VERSION
            );
        }
        let version = db_version as usize;
        if version >= VERSIONED_SCHEMAS.len() {
            bail!("Notifications database version {} is too new", version);
        }

        VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;

        Self::migrate_if_needed(&conn, version)?;

        Ok(SqliteNotificationStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(SqliteNotificationStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &Connection, version: usize) -> Result<()> {
        let mut latest = version;
        for schema in VERSIONED_SCHEMAS.iter().skip(version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!(
                    "Migrating notifications db from version {} to {}",
                    latest, schema.version
                );
                migration_fn(conn)?;
                latest = schema.version;
            }
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest),
            [],
        )?;
        Ok(())
    }

    fn row_to_notification(row: &rusqlite::Row) -> rusqlite::Result<Notification> {
        let kind_str: String = row.get("kind")?;
        let payload_str: String = row.get("payload")?;
        Ok(Notification {
            id: row.get("id")?,
            seller_id: row.get("seller_id")?,
            kind: NotificationKind::from_str(&kind_str).unwrap_or(NotificationKind::System),
            title: row.get("title")?,
            message: row.get("message")?,
            payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
            read: row.get::<_, i64>("read")? != 0,
            delivered: row.get::<_, i64>("delivered")? != 0,
            delivered_at: row.get("delivered_at")?,
            retry_count: row.get("retry_count")?,
            max_retries: row.get("max_retries")?,
            created_at: row.get("created_at")?,
        })
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl NotificationStore for SqliteNotificationStore {
    fn create(
        &self,
        seller_id: &str,
        kind: NotificationKind,
        title: &str,
        message: &str,
        payload: &serde_json::Value,
        max_retries: i32,
    ) -> Result<Notification> {
        let created_at = Self::now();
        let payload_str = serde_json::to_string(payload)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO notification (
                seller_id, kind, title, message, payload, max_retries, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                seller_id,
                kind.as_str(),
                title,
                message,
                payload_str,
                max_retries,
                created_at,
            ],
        )
        .with_context(|| format!("Failed to create notification for seller {}", seller_id))?;

        Ok(Notification {
            id: conn.last_insert_rowid(),
            seller_id: seller_id.to_string(),
            kind,
            title: title.to_string(),
            message: message.to_string(),
            payload: payload.clone(),
            read: false,
            delivered: false,
            delivered_at: None,
            retry_count: 0,
            max_retries,
            created_at,
        })
    }

    fn get(&self, id: i64) -> Result<Option<Notification>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM notification WHERE id = ?1")?;
        Ok(stmt
            .query_row([id], Self::row_to_notification)
            .optional()?)
    }

    fn mark_delivered(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE notification SET delivered = 1, delivered_at = ?2 \
             WHERE id = ?1 AND delivered = 0",
            params![id, Self::now()],
        )
        .with_context(|| format!("Failed to mark notification {} delivered", id))?;
        Ok(())
    }

    fn set_retry_count(&self, id: i64, retry_count: i32) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE notification SET retry_count = ?2 WHERE id = ?1",
            params![id, retry_count],
        )?;
        Ok(())
    }

    fn mark_retry_exhausted(&self, id: i64, attempts: i32) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE notification SET retry_count = max(retry_count, ?2) \
             WHERE id = ?1 AND delivered = 0",
            params![id, attempts],
        )
        .with_context(|| format!("Failed to mark notification {} exhausted", id))?;
        Ok(())
    }

    fn mark_read(&self, seller_id: &str, ids: Option<&[i64]>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let changed = match ids {
            None => conn.execute(
                "UPDATE notification SET read = 1 WHERE seller_id = ?1 AND read = 0",
                params![seller_id],
            )?,
            Some(ids) => {
                let mut changed = 0;
                for id in ids {
                    changed += conn.execute(
                        "UPDATE notification SET read = 1 \
                         WHERE id = ?1 AND seller_id = ?2 AND read = 0",
                        params![id, seller_id],
                    )?;
                }
                changed
            }
        };
        Ok(changed)
    }

    fn list_since(&self, seller_id: &str, after_id: i64, limit: usize) -> Result<Vec<Notification>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM notification WHERE seller_id = ?1 AND id > ?2 \
             ORDER BY id ASC LIMIT ?3",
        )?;
        let notifications = stmt
            .query_map(
                params![seller_id, after_id, limit as i64],
                Self::row_to_notification,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notifications)
    }

    fn list_unread(&self, seller_id: &str, limit: usize) -> Result<Vec<Notification>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM notification WHERE seller_id = ?1 AND read = 0 \
             ORDER BY id ASC LIMIT ?2",
        )?;
        let notifications = stmt
            .query_map(params![seller_id, limit as i64], Self::row_to_notification)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notifications)
    }

    fn stats(&self, seller_id: &str) -> Result<NotificationStats> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT kind,
                      COUNT(*),
                      SUM(CASE WHEN read = 0 THEN 1 ELSE 0 END),
                      SUM(CASE WHEN delivered = 1 THEN 1 ELSE 0 END),
                      SUM(CASE WHEN delivered = 0 AND retry_count >= max_retries
                          THEN 1 ELSE 0 END)
               FROM notification WHERE seller_id = ?1 GROUP BY kind"#,
        )?;
        let by_kind = stmt
            .query_map(params![seller_id], |row| {
                let kind_str: String = row.get(0)?;
                Ok((
                    kind_str,
                    KindStats {
                        total: row.get::<_, i64>(1)? as u64,
                        unread: row.get::<_, i64>(2)? as u64,
                        delivered: row.get::<_, i64>(3)? as u64,
                        exhausted: row.get::<_, i64>(4)? as u64,
                    },
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .filter_map(|(kind_str, stats)| {
                NotificationKind::from_str(&kind_str).map(|kind| (kind, stats))
            })
            .collect();
        Ok(NotificationStats { by_kind })
    }

    fn purge_older_than(&self, max_age_secs: i64, only_read: bool) -> Result<usize> {
        let cutoff = Self::now() - max_age_secs;
        let conn = self.conn.lock().unwrap();
        let purged = if only_read {
            conn.execute(
                "DELETE FROM notification WHERE created_at < ?1 AND read = 1",
                params![cutoff],
            )?
        } else {
            conn.execute(
                "DELETE FROM notification WHERE created_at < ?1",
                params![cutoff],
            )?
        };
        Ok(purged)
    }
}

impl SubscriptionStore for SqliteNotificationStore {
    fn upsert_subscription(&self, subscription: &PushSubscription) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO push_subscription (seller_id, endpoint, p256dh_key, auth_key, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(seller_id) DO UPDATE SET
                   endpoint = excluded.endpoint,
                   p256dh_key = excluded.p256dh_key,
                   auth_key = excluded.auth_key,
                   created_at = excluded.created_at"#,
            params![
                subscription.seller_id,
                subscription.endpoint,
                subscription.p256dh_key,
                subscription.auth_key,
                Self::now(),
            ],
        )
        .with_context(|| {
            format!(
                "Failed to upsert push subscription for seller {}",
                subscription.seller_id
            )
        })?;
        Ok(())
    }

    fn get_subscription(&self, seller_id: &str) -> Result<Option<PushSubscription>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT seller_id, endpoint, p256dh_key, auth_key FROM push_subscription \
             WHERE seller_id = ?1",
        )?;
        Ok(stmt
            .query_row(params![seller_id], |row| {
                Ok(PushSubscription {
                    seller_id: row.get(0)?,
                    endpoint: row.get(1)?,
                    p256dh_key: row.get(2)?,
                    auth_key: row.get(3)?,
                })
            })
            .optional()?)
    }

    fn remove_subscription(&self, seller_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM push_subscription WHERE seller_id = ?1",
            params![seller_id],
        )?;
        Ok(removed > 0)
    }
}
