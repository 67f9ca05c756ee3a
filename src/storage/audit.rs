//! Audit record storage and retrieval.
//!
//! Records live in the `AuditEntry` table. `changes` holds the encoded field
//! map, `timeStamp` an RFC 3339 UTC instant with nanosecond precision.

use crate::audit::{decode_changes, encode_changes, ActionType, AuditRecord};
use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

/// Raw `AuditEntry` row before decoding.
struct AuditRow {
    id: i64,
    entity_name: String,
    action_type: String,
    username: String,
    timestamp: String,
    entity_id: String,
    changes: String,
}

impl TryFrom<AuditRow> for AuditRecord {
    type Error = Error;

    fn try_from(row: AuditRow) -> Result<Self> {
        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .map_err(|e| Error::Other(format!("bad audit timestamp '{}': {e}", row.timestamp)))?
            .with_timezone(&Utc);

        Ok(Self {
            id: Some(row.id),
            entity_name: row.entity_name,
            action_type: row.action_type.parse::<ActionType>()?,
            actor: row.username,
            timestamp,
            entity_key: row.entity_id,
            field_values: decode_changes(&row.changes)?,
        })
    }
}

/// Format a timestamp the way it is stored.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Insert an audit record into the database.
///
/// # Errors
///
/// Returns an error if encoding or the insert fails.
pub fn insert_audit_record(conn: &Connection, record: &AuditRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO AuditEntry (entityName, actionType, username, timeStamp, entityId, changes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            record.entity_name,
            record.action_type.as_str(),
            record.actor,
            format_timestamp(&record.timestamp),
            record.entity_key,
            encode_changes(&record.field_values)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

const SELECT_COLUMNS: &str =
    "SELECT id, entityName, actionType, username, timeStamp, entityId, changes FROM AuditEntry";

fn query_records(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<AuditRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(AuditRow {
                id: row.get(0)?,
                entity_name: row.get(1)?,
                action_type: row.get(2)?,
                username: row.get(3)?,
                timestamp: row.get(4)?,
                entity_id: row.get(5)?,
                changes: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter().map(AuditRecord::try_from).collect()
}

/// Get audit records for one entity, newest first.
///
/// # Errors
///
/// Returns an error if the query fails or a stored row cannot be decoded.
pub fn get_audit_records(
    conn: &Connection,
    entity_name: &str,
    entity_key: &str,
    limit: Option<u32>,
) -> Result<Vec<AuditRecord>> {
    let limit = limit.unwrap_or(100);
    let sql = format!("{SELECT_COLUMNS} WHERE entityName = ?1 AND entityId = ?2 ORDER BY id DESC LIMIT ?3");
    query_records(conn, &sql, rusqlite::params![entity_name, entity_key, limit])
}

/// List recent audit records, optionally for one entity type, newest first.
///
/// # Errors
///
/// Returns an error if the query fails or a stored row cannot be decoded.
pub fn list_audit_records(
    conn: &Connection,
    entity_name: Option<&str>,
    limit: Option<u32>,
) -> Result<Vec<AuditRecord>> {
    let limit = limit.unwrap_or(100);
    match entity_name {
        Some(name) => {
            let sql = format!("{SELECT_COLUMNS} WHERE entityName = ?1 ORDER BY id DESC LIMIT ?2");
            query_records(conn, &sql, rusqlite::params![name, limit])
        }
        None => {
            let sql = format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1");
            query_records(conn, &sql, rusqlite::params![limit])
        }
    }
}
