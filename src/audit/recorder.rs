//! Builds audit drafts for detected entries.

use crate::audit::record::{ActionType, AuditDraft, PendingField};
use crate::error::{Error, Result};
use crate::model::{FieldMap, FieldValue};
use crate::tracking::TrackedEntry;
use chrono::{DateTime, Utc};

/// Per-save recorder. Actor and timestamp are fixed when the save starts,
/// so every record of one save shares them.
#[derive(Debug, Clone)]
pub struct AuditRecorder {
    actor: String,
    timestamp: DateTime<Utc>,
}

impl AuditRecorder {
    #[must_use]
    pub const fn new(actor: String, timestamp: DateTime<Utc>) -> Self {
        Self { actor, timestamp }
    }

    #[must_use]
    pub fn actor(&self) -> &str {
        &self.actor
    }

    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Capture one auditable entry.
    ///
    /// # Errors
    ///
    /// Returns `Detection` if the entry is not auditable or cannot produce a
    /// declared field.
    pub fn record(&self, entry: &TrackedEntry, action_type: ActionType) -> Result<AuditDraft> {
        let entity = entry.entity();
        let schema = entity.schema();
        let auditable = entity.as_auditable().ok_or_else(|| {
            Error::Detection(format!("{} is not auditable", schema.name))
        })?;

        let mut field_values = FieldMap::new();
        let mut pending = Vec::new();
        let mut entity_key = String::new();

        for def in schema.fields {
            let is_key = schema.is_key(def.name);
            if entry.is_temporary(def) {
                pending.push(PendingField {
                    name: def.name,
                    is_key,
                });
                field_values.insert(def.name.to_string(), FieldValue::Null);
                continue;
            }

            let value = entry.current(def.name).ok_or_else(|| {
                Error::Detection(format!(
                    "{} declares field '{}' but does not expose it",
                    schema.name, def.name
                ))
            })?;
            if is_key {
                entity_key = value.to_string();
            }
            field_values.insert(def.name.to_string(), value);
        }

        Ok(AuditDraft {
            entry: entry.id(),
            entity_name: auditable.audit_name().to_string(),
            action_type,
            actor: self.actor.clone(),
            timestamp: self.timestamp,
            entity_key,
            field_values,
            pending,
        })
    }
}
