use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

/// V 0
const RETRY_JOB_TABLE_V_0: Table = Table {
    name: "retry_job",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            autoincrement = true
        ),
        sqlite_column!("notification_id", &SqlType::Integer, non_null = true),
        sqlite_column!("seller_id", &SqlType::Text, non_null = true),
        sqlite_column!(
            "priority",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'PENDING'")
        ),
        sqlite_column!(
            "retry_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("next_retry_at", &SqlType::Integer, non_null = true),
        sqlite_column!("last_error", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[
        ("idx_retry_job_claim_order", "status, priority, next_retry_at"),
        ("idx_retry_job_notification", "notification_id"),
    ],
};

pub const RETRY_QUEUE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[RETRY_JOB_TABLE_V_0],
    migration: None,
}];
