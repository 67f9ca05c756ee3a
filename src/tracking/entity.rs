//! Entity metadata and the capabilities the change tracker relies on.

use crate::error::{Error, Result};
use crate::model::{FieldMap, FieldValue};
use std::any::Any;
use std::fmt::Debug;

/// A persistable field of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Field (and column) name.
    pub name: &'static str,
    /// Value is assigned by storage on insert (e.g. an autoincrement key).
    pub generated: bool,
}

impl FieldDef {
    #[must_use]
    pub const fn plain(name: &'static str) -> Self {
        Self {
            name,
            generated: false,
        }
    }

    #[must_use]
    pub const fn generated(name: &'static str) -> Self {
        Self {
            name,
            generated: true,
        }
    }
}

/// Static description of an entity type.
#[derive(Debug)]
pub struct EntitySchema {
    /// Runtime type name, recorded as the audit `entityName`.
    pub name: &'static str,
    /// Backing table.
    pub table: &'static str,
    /// Primary-key field name; must also appear in `fields`.
    pub key: &'static str,
    /// Every persistable field, key included.
    pub fields: &'static [FieldDef],
}

impl EntitySchema {
    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether `name` is the primary key.
    #[must_use]
    pub fn is_key(&self, name: &str) -> bool {
        self.key == name
    }

    /// Fields other than the primary key.
    pub fn non_key_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.name != self.key)
    }
}

/// An object the change tracker can own, diff and hand to storage.
///
/// Implementors expose their fields by name so the tracker can snapshot them
/// and storage can write generated values back after an insert.
pub trait Entity: Any + Debug {
    /// Static metadata for this entity type.
    fn schema(&self) -> &'static EntitySchema;

    /// Current value of `field`, or `None` if the entity has no such field.
    fn get(&self, field: &str) -> Option<FieldValue>;

    /// Overwrite `field`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` for undeclared fields, or `InvalidArgument`
    /// if the value has the wrong shape.
    fn set(&mut self, field: &str, value: FieldValue) -> Result<()>;

    /// Auditable capability. Types that want their mutations audited
    /// implement [`Auditable`] and return `Some(self)` here.
    fn as_auditable(&self) -> Option<&dyn Auditable> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Marker capability: mutations of this entity type are audited.
pub trait Auditable: Entity {
    /// Name recorded in the audit trail.
    fn audit_name(&self) -> &'static str {
        self.schema().name
    }
}

/// Snapshot every declared field of `entity`.
///
/// # Errors
///
/// Returns `Detection` if the entity cannot produce a field its schema declares.
pub fn snapshot(entity: &dyn Entity) -> Result<FieldMap> {
    let schema = entity.schema();
    schema
        .fields
        .iter()
        .map(|def| {
            entity
                .get(def.name)
                .map(|value| (def.name.to_string(), value))
                .ok_or_else(|| {
                    Error::Detection(format!(
                        "{} declares field '{}' but does not expose it",
                        schema.name, def.name
                    ))
                })
        })
        .collect()
}

/// Build the `UnknownField` error for `entity`.
pub(crate) fn unknown_field(schema: &EntitySchema, field: &str) -> Error {
    Error::UnknownField {
        entity: schema.name.to_string(),
        field: field.to_string(),
    }
}
