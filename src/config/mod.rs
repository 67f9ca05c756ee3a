//! Configuration management.
//!
//! This module provides functions for resolving the database path and the
//! identity recorded in the audit trail.
//!
//! # Architecture
//!
//! SaveAudit uses a single **global database** at
//! `~/.saveaudit/data/saveaudit.db` unless a path is given explicitly.

use std::path::{Path, PathBuf};

/// Get the global SaveAudit directory location (`~/.saveaudit/`).
#[must_use]
pub fn global_saveaudit_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".saveaudit"))
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0" && value.to_lowercase() != "false"
}

/// Check if test mode is enabled.
///
/// Test mode is enabled by setting `SA_TEST_DB=1` (or any non-empty value).
/// This redirects all database operations to an isolated test database.
#[must_use]
pub fn is_test_mode() -> bool {
    std::env::var("SA_TEST_DB")
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

/// Get the test database path.
///
/// Returns `~/.saveaudit/test/saveaudit.db` for isolated testing.
#[must_use]
pub fn test_db_path() -> Option<PathBuf> {
    global_saveaudit_dir().map(|dir| dir.join("test").join("saveaudit.db"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `SA_TEST_DB` environment variable → uses test database
/// 3. `SA_DB` environment variable
/// 4. Global location: `~/.saveaudit/data/saveaudit.db`
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no location found.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if is_test_mode() {
        return test_db_path();
    }

    if let Ok(db_path) = std::env::var("SA_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_saveaudit_dir().map(|dir| dir.join("data").join("saveaudit.db"))
}

/// Resolve the identity performing changes.
///
/// Priority:
/// 1. Explicit `--actor` flag
/// 2. `SA_ACTOR` environment variable
/// 3. `None`, recorded as unauthenticated
#[must_use]
pub fn resolve_actor(explicit: Option<&str>) -> Option<String> {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var("SA_ACTOR").ok())
        .map(|actor| actor.trim().to_string())
        .filter(|actor| !actor.is_empty())
}
