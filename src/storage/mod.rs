//! SQLite storage layer for SaveAudit.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - IMMEDIATE transactions for every write
//! - The `AuditEntry` table for the audit trail
//!
//! # Submodules
//!
//! - [`audit`] - Audit record storage and retrieval
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod audit;
pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::audit::AuditRecord;
use crate::error::Result;
use crate::tracking::ChangeTracker;

/// Storage engine boundary used by the audited save.
pub trait Store {
    /// Write every inserted, updated and deleted entry of `tracker` as one
    /// transaction and return the number of rows written.
    ///
    /// Updates and deletes target the key the entity was loaded under.
    /// Storage-generated values are written back into the entities only
    /// after the transaction has committed; a value an entity refuses is
    /// logged and left unassigned.
    ///
    /// # Errors
    ///
    /// Returns the storage error unchanged if the transaction fails; nothing
    /// is written back then.
    fn commit(&mut self, tracker: &mut ChangeTracker) -> Result<usize>;

    /// Persist resolved audit records as one transaction, assigning their ids.
    ///
    /// # Errors
    ///
    /// Returns the storage error; no ids are assigned on failure.
    fn persist_audit(&mut self, records: &mut [AuditRecord]) -> Result<usize>;
}
