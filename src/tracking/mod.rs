//! Change tracking for the unit of work.
//!
//! # Submodules
//!
//! - [`entity`] - Entity metadata and the `Entity` / `Auditable` capabilities
//! - [`tracker`] - The `ChangeTracker` and its dirty check

pub mod entity;
pub mod tracker;

pub use entity::{snapshot, Auditable, Entity, EntitySchema, FieldDef};
pub use tracker::{ChangeTracker, EntityState, EntryId, TrackedEntry};
