//! Audit records.
//!
//! A record is built in two phases. [`AuditDraft`] is captured before the
//! business commit and may hold placeholders for storage-generated fields;
//! [`AuditDraft::resolve`] reads their final values after the commit and
//! yields an [`AuditRecord`], the only form that can be persisted.

use crate::error::{Error, Result};
use crate::model::{FieldMap, FieldValue};
use crate::tracking::{ChangeTracker, EntryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of audited mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    Insert,
    Update,
    Delete,
}

impl ActionType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(Error::InvalidArgument(format!("unknown action type: {s}"))),
        }
    }
}

/// A field whose value is assigned by storage during the commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingField {
    pub name: &'static str,
    pub is_key: bool,
}

/// Pre-commit audit record.
#[derive(Debug, Clone)]
pub struct AuditDraft {
    /// Tracked entry this draft was captured from.
    pub entry: EntryId,
    pub entity_name: String,
    pub action_type: ActionType,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    /// Empty while the key is pending.
    pub entity_key: String,
    /// Pending fields hold `FieldValue::Null` here until resolved.
    pub field_values: FieldMap,
    pub pending: Vec<PendingField>,
}

impl AuditDraft {
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Fill in every pending field from the entry's post-commit state.
    ///
    /// # Errors
    ///
    /// Returns `Resolution` if the entry is gone, a pending field is still
    /// unassigned, or the record would be persisted without a key.
    pub fn resolve(mut self, tracker: &ChangeTracker) -> Result<AuditRecord> {
        let entry = tracker.entry(self.entry).ok_or_else(|| Error::Resolution {
            entity: self.entity_name.clone(),
            field: String::new(),
            reason: format!("tracked entry {} no longer exists", self.entry),
        })?;

        for field in std::mem::take(&mut self.pending) {
            let value = entry
                .current(field.name)
                .filter(|v| !v.is_null())
                .ok_or_else(|| Error::Resolution {
                    entity: self.entity_name.clone(),
                    field: field.name.to_string(),
                    reason: "storage did not assign a value".to_string(),
                })?;

            if field.is_key {
                self.entity_key = value.to_string();
            }
            self.field_values.insert(field.name.to_string(), value);
        }

        if self.entity_key.is_empty() {
            return Err(Error::Resolution {
                entity: self.entity_name,
                field: entry.entity().schema().key.to_string(),
                reason: "entity key is empty".to_string(),
            });
        }

        Ok(AuditRecord {
            id: None,
            entity_name: self.entity_name,
            action_type: self.action_type,
            actor: self.actor,
            timestamp: self.timestamp,
            entity_key: self.entity_key,
            field_values: self.field_values,
        })
    }
}

/// A resolved audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Assigned by storage on persist.
    pub id: Option<i64>,
    pub entity_name: String,
    pub action_type: ActionType,
    /// Stored in the `username` column.
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub entity_key: String,
    pub field_values: FieldMap,
}

impl AuditRecord {
    /// Value captured for `field`.
    #[must_use]
    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.field_values.get(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Vehicle;

    fn draft_for(tracker: &ChangeTracker, entry: EntryId) -> AuditDraft {
        let mut field_values = crate::tracking::snapshot(tracker.entry(entry).unwrap().entity())
            .unwrap();
        field_values.insert("id".into(), FieldValue::Null);
        AuditDraft {
            entry,
            entity_name: "Vehicle".into(),
            action_type: ActionType::Insert,
            actor: "tester".into(),
            timestamp: Utc::now(),
            entity_key: String::new(),
            field_values,
            pending: vec![PendingField {
                name: "id",
                is_key: true,
            }],
        }
    }

    #[test]
    fn test_action_type_parse() {
        assert_eq!("insert".parse::<ActionType>().unwrap(), ActionType::Insert);
        assert_eq!("DELETE".parse::<ActionType>().unwrap(), ActionType::Delete);
        assert!("UPSERT".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_resolve_backfills_key() {
        let mut tracker = ChangeTracker::new();
        let entry = tracker.add(Vehicle::new("car", "red"));
        let draft = draft_for(&tracker, entry);
        assert!(draft.has_pending());

        tracker.get_mut::<Vehicle>(entry).unwrap().id = Some(12);
        let record = draft.resolve(&tracker).unwrap();

        assert_eq!(record.entity_key, "12");
        assert_eq!(record.value("id"), Some(&FieldValue::Integer(12)));
        assert_eq!(record.value("color"), Some(&FieldValue::from("red")));
    }

    #[test]
    fn test_resolve_fails_when_storage_assigned_nothing() {
        let mut tracker = ChangeTracker::new();
        let entry = tracker.add(Vehicle::new("car", "red"));
        let draft = draft_for(&tracker, entry);

        let err = draft.resolve(&tracker).unwrap_err();
        assert!(matches!(err, Error::Resolution { ref field, .. } if field == "id"));
    }
}
