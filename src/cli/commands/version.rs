//! Version command implementation.

use crate::error::Result;
use crate::storage::schema::CURRENT_SCHEMA_VERSION;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput {
    version: &'static str,
    schema: i32,
    profile: &'static str,
}

fn version_info() -> VersionOutput {
    VersionOutput {
        version: env!("CARGO_PKG_VERSION"),
        schema: CURRENT_SCHEMA_VERSION,
        profile: if cfg!(debug_assertions) { "dev" } else { "release" },
    }
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let info = version_info();

    if json {
        println!("{}", serde_json::to_string(&info)?);
    } else {
        println!(
            "sa version {} (schema v{}, {})",
            info.version, info.schema, info.profile
        );
    }

    Ok(())
}
