//! Initialize the SaveAudit database.
//!
//! Creates the database file (default `~/.saveaudit/data/saveaudit.db`, or the
//! path given by `--db`) and applies the schema, so the `Vehicle` and
//! `AuditEntry` tables exist before the first save.

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::storage::SqliteStore;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    created: bool,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the database already exists (without `--force`) or
/// cannot be created.
pub fn execute(db_path: Option<&PathBuf>, force: bool, json: bool) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(|p| p.as_path())).ok_or_else(|| {
        Error::Config("Could not determine SaveAudit database location".to_string())
    })?;

    initialize(&db_path, force)?;

    if json {
        let output = InitOutput {
            database: db_path,
            created: true,
        };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
    } else {
        println!("Initialized SaveAudit database");
        println!("  Database: {}", db_path.display());
    }

    Ok(())
}

fn initialize(db_path: &Path, force: bool) -> Result<()> {
    if db_path.exists() {
        if !force {
            return Err(Error::AlreadyInitialized {
                path: db_path.to_path_buf(),
            });
        }
        fs::remove_file(db_path)?;
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = db_path.as_os_str().to_owned();
            sidecar.push(suffix);
            let sidecar = PathBuf::from(sidecar);
            if sidecar.exists() {
                fs::remove_file(sidecar)?;
            }
        }
    }

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }

    SqliteStore::open(db_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_database_with_schema() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("nested").join("sa.db");

        initialize(&db, false).unwrap();
        assert!(db.exists());

        let store = SqliteStore::open(&db).unwrap();
        assert!(store.list_audit_records(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_init_fails_if_already_initialized() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("sa.db");

        assert!(initialize(&db, false).is_ok());
        let result = initialize(&db, false);
        assert!(matches!(result, Err(Error::AlreadyInitialized { .. })));
    }

    #[test]
    fn test_init_force_recreates() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("sa.db");
        initialize(&db, false).unwrap();

        let mut ctx = crate::audit::AuditContext::new(SqliteStore::open(&db).unwrap(), None::<String>);
        ctx.add(crate::model::Vehicle::new("car", "red"));
        ctx.save().unwrap();
        drop(ctx);

        assert!(initialize(&db, true).is_ok());
        let store = SqliteStore::open(&db).unwrap();
        assert!(store.list_vehicles(None).unwrap().is_empty());
    }
}
