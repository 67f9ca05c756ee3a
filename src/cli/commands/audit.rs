//! Audit trail command implementations.

use crate::audit::{encode_changes, ActionType, AuditRecord};
use crate::cli::commands::open_store;
use crate::cli::AuditCommands;
use crate::error::Result;
use crate::storage::audit::format_timestamp;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

/// Output for audit list.
#[derive(Serialize)]
struct AuditListOutput {
    records: Vec<AuditRecord>,
    count: usize,
}

/// Execute audit commands.
///
/// # Errors
///
/// Returns an error if the database is missing or a stored row cannot be decoded.
pub fn execute(command: &AuditCommands, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    match command {
        AuditCommands::List { entity, id, limit } => {
            list(entity.as_deref(), id.as_deref(), *limit, db_path, json)
        }
    }
}

fn list(
    entity: Option<&str>,
    id: Option<&str>,
    limit: u32,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let store = open_store(db_path)?;
    let records = match (entity, id) {
        (Some(entity), Some(id)) => store.get_audit_records(entity, id, Some(limit))?,
        (entity, _) => store.list_audit_records(entity, Some(limit))?,
    };

    if crate::is_csv() {
        println!("id,entityName,actionType,username,timeStamp,entityId,changes");
        for r in &records {
            println!(
                "{},{},{},{},{},{},{}",
                r.id.unwrap_or_default(),
                crate::csv_escape(&r.entity_name),
                r.action_type,
                crate::csv_escape(&r.actor),
                format_timestamp(&r.timestamp),
                crate::csv_escape(&r.entity_key),
                crate::csv_escape(&encode_changes(&r.field_values)?),
            );
        }
        return Ok(());
    }

    if json {
        let output = AuditListOutput {
            count: records.len(),
            records,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No audit records found.");
        return Ok(());
    }

    println!("{}", format!("Audit trail ({})", records.len()).cyan().bold());
    for r in &records {
        let action = match r.action_type {
            ActionType::Insert => r.action_type.as_str().green(),
            ActionType::Update => r.action_type.as_str().yellow(),
            ActionType::Delete => r.action_type.as_str().red(),
        };
        println!(
            "  {} {:<6} {}#{} by {} {}",
            format!("[{}]", r.id.unwrap_or_default()).dimmed(),
            action,
            r.entity_name,
            r.entity_key,
            r.actor.bold(),
            r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        );
        println!("      {}", encode_changes(&r.field_values)?.dimmed());
    }

    Ok(())
}
