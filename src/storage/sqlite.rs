//! SQLite storage implementation.
//!
//! This module provides the storage engine behind the audited save. Entity
//! writes are driven by each entity's [`EntitySchema`]; every write runs
//! inside an IMMEDIATE transaction via [`SqliteStore::mutate`].

use crate::audit::AuditRecord;
use crate::error::{Error, Result};
use crate::model::{FieldValue, Vehicle};
use crate::storage::audit::{get_audit_records, insert_audit_record, list_audit_records};
use crate::storage::schema::apply_schema;
use crate::storage::Store;
use crate::tracking::{ChangeTracker, EntityState, EntitySchema, EntryId, FieldDef, TrackedEntry};
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error};

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

/// A storage-generated value to write back once the commit is durable.
type Generated = (EntryId, &'static str, FieldValue);

impl SqliteStore {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside an IMMEDIATE transaction.
    ///
    /// Commits if `f` succeeds; the transaction is rolled back on drop otherwise.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or from beginning/committing the transaction.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let result = f(&tx)?;
        tx.commit()?;

        debug!(op, "Transaction committed");
        Ok(result)
    }

    // ==================
    // Vehicle Queries
    // ==================

    /// Get a vehicle by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_vehicle(&self, id: i64) -> Result<Option<Vehicle>> {
        let vehicle = self
            .conn
            .query_row(
                "SELECT id, type, color, model, owner FROM Vehicle WHERE id = ?1",
                [id],
                map_vehicle_row,
            )
            .optional()?;

        Ok(vehicle)
    }

    /// List vehicles, lowest id first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_vehicles(&self, limit: Option<u32>) -> Result<Vec<Vehicle>> {
        let limit = limit.unwrap_or(100);
        let mut stmt = self
            .conn
            .prepare("SELECT id, type, color, model, owner FROM Vehicle ORDER BY id LIMIT ?1")?;

        let vehicles = stmt
            .query_map([limit], map_vehicle_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(vehicles)
    }

    // ==================
    // Audit Queries
    // ==================

    /// Audit trail of one entity, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_audit_records(
        &self,
        entity_name: &str,
        entity_key: &str,
        limit: Option<u32>,
    ) -> Result<Vec<AuditRecord>> {
        get_audit_records(&self.conn, entity_name, entity_key, limit)
    }

    /// Recent audit records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_audit_records(
        &self,
        entity_name: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<AuditRecord>> {
        list_audit_records(&self.conn, entity_name, limit)
    }
}

impl Store for SqliteStore {
    fn commit(&mut self, tracker: &mut ChangeTracker) -> Result<usize> {
        if !tracker.has_changes() {
            return Ok(0);
        }

        let (rows, generated) = self.mutate("commit", |tx| {
            let mut rows = 0;
            let mut generated = Vec::new();

            for entry in tracker.entries() {
                rows += match entry.state() {
                    EntityState::Inserted => insert_entry(tx, entry, &mut generated)?,
                    EntityState::Updated => update_entry(tx, entry)?,
                    EntityState::Deleted => delete_entry(tx, entry)?,
                    EntityState::Unchanged | EntityState::Detached => 0,
                };
            }

            Ok((rows, generated))
        })?;

        // The rows are durable from here on; a value the entity refuses stays
        // unassigned and surfaces when its audit record is resolved.
        for (id, field, value) in generated {
            let written = tracker
                .entry_mut(id)
                .and_then(|entry| entry.entity_mut().set(field, value));
            if let Err(e) = written {
                error!(entry = %id, field, error = %e, "Could not write back generated value");
            }
        }

        Ok(rows)
    }

    fn persist_audit(&mut self, records: &mut [AuditRecord]) -> Result<usize> {
        let ids = self.mutate("persist_audit", |tx| {
            records
                .iter()
                .map(|record| insert_audit_record(tx, record))
                .collect::<Result<Vec<_>>>()
        })?;

        for (record, id) in records.iter_mut().zip(ids) {
            record.id = Some(id);
        }

        Ok(records.len())
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn current_value(entry: &TrackedEntry, schema: &EntitySchema, field: &str) -> Result<FieldValue> {
    entry.current(field).ok_or_else(|| Error::UnknownField {
        entity: schema.name.to_string(),
        field: field.to_string(),
    })
}

/// Key the row was loaded under; edits to the in-memory key never retarget a write.
fn stored_key(entry: &TrackedEntry, schema: &EntitySchema) -> Result<FieldValue> {
    let key = entry.baseline().get(schema.key).cloned().unwrap_or_default();
    if key.is_null() {
        return Err(Error::InvalidArgument(format!(
            "{} has no key; it cannot be updated or deleted",
            schema.name
        )));
    }
    Ok(key)
}

fn insert_entry(tx: &Transaction, entry: &TrackedEntry, generated: &mut Vec<Generated>) -> Result<usize> {
    let schema = entry.entity().schema();
    let (temporary, provided): (Vec<&FieldDef>, Vec<&FieldDef>) =
        schema.fields.iter().partition(|def| entry.is_temporary(def));

    let sql = if provided.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", quote(schema.table))
    } else {
        let columns: Vec<String> = provided.iter().map(|def| quote(def.name)).collect();
        let placeholders: Vec<String> = (1..=provided.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(schema.table),
            columns.join(", "),
            placeholders.join(", ")
        )
    };

    let values = provided
        .iter()
        .map(|def| current_value(entry, schema, def.name))
        .collect::<Result<Vec<_>>>()?;
    let rows = tx.execute(&sql, rusqlite::params_from_iter(values.iter()))?;

    let rowid = tx.last_insert_rowid();
    for def in temporary {
        let value: FieldValue = tx.query_row(
            &format!(
                "SELECT {} FROM {} WHERE rowid = ?1",
                quote(def.name),
                quote(schema.table)
            ),
            [rowid],
            |row| row.get(0),
        )?;
        generated.push((entry.id(), def.name, value));
    }

    Ok(rows)
}

fn update_entry(tx: &Transaction, entry: &TrackedEntry) -> Result<usize> {
    let schema = entry.entity().schema();
    let key = stored_key(entry, schema)?;

    // Only the columns that differ from the baseline are written
    let mut assignments = Vec::new();
    let mut values = Vec::new();
    for def in schema.non_key_fields() {
        let value = current_value(entry, schema, def.name)?;
        if entry.baseline().get(def.name) != Some(&value) {
            values.push(value);
            assignments.push(format!("{} = ?{}", quote(def.name), values.len()));
        }
    }
    if assignments.is_empty() {
        return Ok(0);
    }
    values.push(key.clone());

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        quote(schema.table),
        assignments.join(", "),
        quote(schema.key),
        values.len()
    );
    let rows = tx.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
    if rows == 0 {
        return Err(Error::Concurrency {
            entity: schema.name.to_string(),
            key: key.to_string(),
        });
    }

    Ok(rows)
}

fn delete_entry(tx: &Transaction, entry: &TrackedEntry) -> Result<usize> {
    let schema = entry.entity().schema();
    let key = stored_key(entry, schema)?;

    let sql = format!(
        "DELETE FROM {} WHERE {} = ?1",
        quote(schema.table),
        quote(schema.key)
    );
    let rows = tx.execute(&sql, [&key])?;
    if rows == 0 {
        return Err(Error::Concurrency {
            entity: schema.name.to_string(),
            key: key.to_string(),
        });
    }

    Ok(rows)
}

fn map_vehicle_row(row: &rusqlite::Row) -> rusqlite::Result<Vehicle> {
    Ok(Vehicle {
        id: row.get(0)?,
        kind: row.get(1)?,
        color: row.get(2)?,
        model: row.get(3)?,
        owner: row.get(4)?,
    })
}
