//! Command implementations.

pub mod audit;
pub mod init;
pub mod vehicle;
pub mod version;

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::storage::SqliteStore;
use std::path::PathBuf;

/// Open the store for a command, requiring an initialized database.
pub(crate) fn open_store(db_path: Option<&PathBuf>) -> Result<SqliteStore> {
    let db_path = resolve_db_path(db_path.map(|p| p.as_path())).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    SqliteStore::open(&db_path)
}
