//! Encoding of the audit `changes` column.
//!
//! Field maps are stored as compact JSON objects. Non-finite reals have no
//! JSON form and encode as `null`.

use crate::error::Result;
use crate::model::FieldMap;

/// Encode a field map for storage.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_changes(changes: &FieldMap) -> Result<String> {
    Ok(serde_json::to_string(changes)?)
}

/// Decode a stored `changes` value.
///
/// # Errors
///
/// Returns an error if the text is not a JSON object of scalar values.
pub fn decode_changes(encoded: &str) -> Result<FieldMap> {
    Ok(serde_json::from_str(encoded)?)
}
