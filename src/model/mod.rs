//! Data models for SaveAudit.
//!
//! This module contains:
//! - FieldValue / FieldMap (captured field values)
//! - Vehicle (the example audited entity)

pub mod value;
pub mod vehicle;

pub use value::{FieldMap, FieldValue};
pub use vehicle::Vehicle;
