//! Database schema definitions.
//!
//! The schema is plain idempotent DDL applied on every open. Column names of
//! `AuditEntry` follow the audit trail's published layout.

use rusqlite::{Connection, Result};

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the SaveAudit database.
pub const SCHEMA_SQL: &str = r#"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Business Tables
-- ====================

-- Vehicles: the example audited entity
CREATE TABLE IF NOT EXISTS Vehicle (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT CHECK (length(type) <= 100),
    color TEXT CHECK (length(color) <= 100),
    model TEXT CHECK (length(model) <= 100),
    owner TEXT CHECK (length(owner) <= 100)
);

-- ====================
-- Audit Trail
-- ====================

CREATE TABLE IF NOT EXISTS AuditEntry (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entityName TEXT NOT NULL,
    actionType TEXT NOT NULL CHECK (actionType IN ('INSERT', 'UPDATE', 'DELETE')),
    username TEXT NOT NULL,
    timeStamp TEXT NOT NULL,
    entityId TEXT NOT NULL CHECK (entityId <> ''),
    changes TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_entity ON AuditEntry(entityName, entityId);
CREATE INDEX IF NOT EXISTS idx_audit_username ON AuditEntry(username);
CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON AuditEntry(timeStamp DESC);
"#;

/// Apply the schema to a database connection.
///
/// # Errors
///
/// Returns an error if the schema cannot be applied.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    // Set pragmas before schema creation
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    // Record schema version
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}
