//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for list commands.
#[derive(ValueEnum, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table (default)
    #[default]
    Table,
    /// JSON (same as --json)
    Json,
    /// Comma-separated values
    Csv,
}

pub mod commands;

/// SaveAudit CLI - every save leaves an audit trail
#[derive(Parser, Debug)]
#[command(name = "sa", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.saveaudit/data/saveaudit.db)
    #[arg(long, global = true, env = "SA_DB")]
    pub db: Option<PathBuf>,

    /// Identity recorded in the audit trail (default: unauthenticated)
    #[arg(long, global = true, env = "SA_ACTOR")]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Output format (table, json, csv)
    #[arg(long, value_enum, global = true, default_value_t)]
    pub format: OutputFormat,

    /// Output only the ID (for scripting)
    #[arg(long, global = true)]
    pub silent: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the SaveAudit database
    Init {
        /// Recreate an existing database
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Vehicle records (audited)
    Vehicle {
        #[command(subcommand)]
        command: VehicleCommands,
    },

    /// Audit trail queries
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

// ============================================================================
// Vehicle Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum VehicleCommands {
    /// Add a vehicle
    Add(VehicleFields),

    /// Update fields of a vehicle
    Update {
        /// Vehicle ID
        id: i64,

        #[command(flatten)]
        fields: VehicleFields,

        /// Clear a field (repeatable)
        #[arg(long = "clear", value_name = "FIELD")]
        clear: Vec<String>,
    },

    /// Delete a vehicle
    Delete {
        /// Vehicle ID
        id: i64,
    },

    /// List vehicles
    List {
        /// Maximum vehicles to return
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },
}

/// Editable vehicle fields.
#[derive(Args, Debug, Default, Clone)]
pub struct VehicleFields {
    /// Vehicle type (car, van, truck, ...)
    #[arg(long = "type", short = 't')]
    pub kind: Option<String>,

    /// Color
    #[arg(long, short)]
    pub color: Option<String>,

    /// Model
    #[arg(long, short)]
    pub model: Option<String>,

    /// Owner
    #[arg(long, short)]
    pub owner: Option<String>,
}

impl VehicleFields {
    /// Whether no field was given.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.kind.is_none() && self.color.is_none() && self.model.is_none() && self.owner.is_none()
    }
}

// ============================================================================
// Audit Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum AuditCommands {
    /// List audit records, newest first
    List {
        /// Filter by entity name (e.g. Vehicle)
        #[arg(short, long)]
        entity: Option<String>,

        /// Filter by entity key (requires --entity)
        #[arg(long, requires = "entity")]
        id: Option<String>,

        /// Maximum records to return
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },
}
