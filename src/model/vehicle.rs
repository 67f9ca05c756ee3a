//! Vehicle model, the example audited entity.

use crate::error::{Error, Result};
use crate::model::FieldValue;
use crate::tracking::entity::unknown_field;
use crate::tracking::{Auditable, Entity, EntitySchema, FieldDef};
use serde::{Deserialize, Serialize};
use std::any::Any;

/// A vehicle record.
///
/// Text columns are limited to 100 characters by the table definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Row id, assigned by storage on insert
    pub id: Option<i64>,

    /// Vehicle type ("car", "van", ...)
    #[serde(rename = "type")]
    pub kind: Option<String>,

    pub color: Option<String>,

    pub model: Option<String>,

    pub owner: Option<String>,
}

impl Vehicle {
    pub const SCHEMA: EntitySchema = EntitySchema {
        name: "Vehicle",
        table: "Vehicle",
        key: "id",
        fields: &[
            FieldDef::generated("id"),
            FieldDef::plain("type"),
            FieldDef::plain("color"),
            FieldDef::plain("model"),
            FieldDef::plain("owner"),
        ],
    };

    /// Create an unsaved vehicle.
    pub fn new(kind: &str, color: &str) -> Self {
        Self {
            id: None,
            kind: Some(kind.to_string()),
            color: Some(color.to_string()),
            model: None,
            owner: None,
        }
    }
}

fn text(field: &str, value: FieldValue) -> Result<Option<String>> {
    value
        .into_opt_text()
        .map_err(|v| Error::InvalidArgument(format!("Vehicle.{field} expects text, got {v:?}")))
}

impl Entity for Vehicle {
    fn schema(&self) -> &'static EntitySchema {
        &Self::SCHEMA
    }

    fn get(&self, field: &str) -> Option<FieldValue> {
        match field {
            "id" => Some(self.id.into()),
            "type" => Some(self.kind.clone().into()),
            "color" => Some(self.color.clone().into()),
            "model" => Some(self.model.clone().into()),
            "owner" => Some(self.owner.clone().into()),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: FieldValue) -> Result<()> {
        match field {
            "id" => {
                self.id = match value {
                    FieldValue::Null => None,
                    FieldValue::Integer(i) => Some(i),
                    other => {
                        return Err(Error::InvalidArgument(format!(
                            "Vehicle.id expects an integer, got {other:?}"
                        )));
                    }
                };
            }
            "type" => self.kind = text(field, value)?,
            "color" => self.color = text(field, value)?,
            "model" => self.model = text(field, value)?,
            "owner" => self.owner = text(field, value)?,
            _ => return Err(unknown_field(&Self::SCHEMA, field)),
        }
        Ok(())
    }

    fn as_auditable(&self) -> Option<&dyn Auditable> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Auditable for Vehicle {}
