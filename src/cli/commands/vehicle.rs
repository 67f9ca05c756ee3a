//! Vehicle command implementations.
//!
//! Every mutation goes through an [`AuditContext`], so each change lands in
//! the audit trail together with the identity given by `--actor`.

use crate::audit::{AuditContext, AuditRecord, SaveReport};
use crate::cli::commands::open_store;
use crate::cli::{VehicleCommands, VehicleFields};
use crate::config::resolve_actor;
use crate::error::{Error, Result};
use crate::model::{FieldValue, Vehicle};
use crate::storage::SqliteStore;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

/// Output for add/update/delete.
#[derive(Serialize)]
struct SaveOutput {
    vehicle: Vehicle,
    rows_written: usize,
    audit: Vec<AuditRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    audit_errors: Vec<String>,
}

/// Output for vehicle list.
#[derive(Serialize)]
struct VehicleListOutput {
    vehicles: Vec<Vehicle>,
    count: usize,
}

/// Execute vehicle commands.
///
/// # Errors
///
/// Returns an error if the database is missing, the vehicle does not exist,
/// or the business write fails.
pub fn execute(
    command: &VehicleCommands,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    match command {
        VehicleCommands::Add(fields) => add(fields, db_path, actor, json),
        VehicleCommands::Update { id, fields, clear } => {
            update(*id, fields, clear, db_path, actor, json)
        }
        VehicleCommands::Delete { id } => delete(*id, db_path, actor, json),
        VehicleCommands::List { limit } => list(*limit, db_path, json),
    }
}

fn context(db_path: Option<&PathBuf>, actor: Option<&str>) -> Result<AuditContext<SqliteStore>> {
    let store = open_store(db_path)?;
    Ok(AuditContext::new(store, resolve_actor(actor)))
}

fn apply_fields(vehicle: &mut Vehicle, fields: &VehicleFields) {
    if let Some(kind) = &fields.kind {
        vehicle.kind = Some(kind.clone());
    }
    if let Some(color) = &fields.color {
        vehicle.color = Some(color.clone());
    }
    if let Some(model) = &fields.model {
        vehicle.model = Some(model.clone());
    }
    if let Some(owner) = &fields.owner {
        vehicle.owner = Some(owner.clone());
    }
}

fn add(
    fields: &VehicleFields,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    if fields.is_empty() {
        return Err(Error::InvalidArgument(
            "at least one of --type, --color, --model, --owner is required".to_string(),
        ));
    }

    let mut ctx = context(db_path, actor)?;
    let mut vehicle = Vehicle::default();
    apply_fields(&mut vehicle, fields);

    let entry = ctx.add(vehicle);
    let report = ctx.save()?;
    let vehicle = ctx
        .get::<Vehicle>(entry)
        .cloned()
        .ok_or_else(|| Error::Other("saved vehicle is no longer tracked".to_string()))?;

    if crate::is_silent() {
        if let Some(id) = vehicle.id {
            println!("{id}");
        }
        return Ok(());
    }

    let id = vehicle.id.map_or_else(String::new, |id| id.to_string());
    print_save(&format!("Added vehicle {id}"), vehicle, report, json)
}

fn update(
    id: i64,
    fields: &VehicleFields,
    clear: &[String],
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    if fields.is_empty() && clear.is_empty() {
        return Err(Error::InvalidArgument(
            "nothing to update; pass a field flag or --clear".to_string(),
        ));
    }
    if let Some(key) = clear.iter().find(|f| Vehicle::SCHEMA.is_key(f)) {
        return Err(Error::InvalidArgument(format!("cannot clear the key field '{key}'")));
    }

    let mut ctx = context(db_path, actor)?;
    let vehicle = ctx
        .store()
        .get_vehicle(id)?
        .ok_or(Error::VehicleNotFound { id })?;

    let entry = ctx.attach(vehicle)?;
    for field in clear {
        ctx.tracker_mut()
            .entry_mut(entry)?
            .entity_mut()
            .set(field, FieldValue::Null)?;
    }
    if let Some(vehicle) = ctx.get_mut::<Vehicle>(entry) {
        apply_fields(vehicle, fields);
    }

    let report = ctx.save()?;
    let vehicle = ctx
        .get::<Vehicle>(entry)
        .cloned()
        .ok_or(Error::VehicleNotFound { id })?;

    if crate::is_silent() {
        println!("{id}");
        return Ok(());
    }

    let message = if report.rows_written == 0 {
        format!("Vehicle {id} unchanged")
    } else {
        format!("Updated vehicle {id}")
    };
    print_save(&message, vehicle, report, json)
}

fn delete(id: i64, db_path: Option<&PathBuf>, actor: Option<&str>, json: bool) -> Result<()> {
    let mut ctx = context(db_path, actor)?;
    let vehicle = ctx
        .store()
        .get_vehicle(id)?
        .ok_or(Error::VehicleNotFound { id })?;

    let entry = ctx.attach(vehicle.clone())?;
    ctx.remove(entry)?;
    let report = ctx.save()?;

    if crate::is_silent() {
        println!("{id}");
        return Ok(());
    }

    print_save(&format!("Deleted vehicle {id}"), vehicle, report, json)
}

fn list(limit: u32, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let store = open_store(db_path)?;
    let vehicles = store.list_vehicles(Some(limit))?;

    if crate::is_csv() {
        println!("id,type,color,model,owner");
        for v in &vehicles {
            println!(
                "{},{},{},{},{}",
                v.id.map_or_else(String::new, |id| id.to_string()),
                crate::csv_escape(v.kind.as_deref().unwrap_or("")),
                crate::csv_escape(v.color.as_deref().unwrap_or("")),
                crate::csv_escape(v.model.as_deref().unwrap_or("")),
                crate::csv_escape(v.owner.as_deref().unwrap_or("")),
            );
        }
        return Ok(());
    }

    if json {
        let output = VehicleListOutput {
            count: vehicles.len(),
            vehicles,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if vehicles.is_empty() {
        println!("No vehicles found.");
        return Ok(());
    }

    println!("{}", format!("Vehicles ({})", vehicles.len()).cyan().bold());
    for v in &vehicles {
        println!(
            "  {} {} {} {}",
            format!("#{}", v.id.unwrap_or_default()).bold(),
            v.kind.as_deref().unwrap_or("-"),
            v.color.as_deref().unwrap_or("-"),
            v.model.as_deref().unwrap_or("").dimmed(),
        );
        if let Some(owner) = &v.owner {
            println!("      owner: {}", owner.dimmed());
        }
    }

    Ok(())
}

fn print_save(message: &str, vehicle: Vehicle, report: SaveReport, json: bool) -> Result<()> {
    let audit_errors: Vec<String> = report.audit_errors.iter().map(ToString::to_string).collect();

    if json {
        let output = SaveOutput {
            vehicle,
            rows_written: report.rows_written,
            audit: report.audited,
            audit_errors,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{}", message.green());
    for record in &report.audited {
        println!(
            "  {} {} by {}",
            "audit:".dimmed(),
            record.action_type,
            record.actor.bold()
        );
    }
    for error in &audit_errors {
        eprintln!("  {} {error}", "warning: change saved but not audited:".yellow());
    }

    Ok(())
}
