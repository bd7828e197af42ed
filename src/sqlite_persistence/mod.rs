//! Shared SQLite schema machinery.
//!
//! Both databases (notifications and retry queue) describe their tables
//! declaratively and go through the same create/validate/migrate path.

mod versioned_schema;

pub use versioned_schema::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
    DEFAULT_TIMESTAMP,
};
