//! Change detection: which tracked entries need an audit record.

use crate::audit::record::ActionType;
use crate::error::Result;
use crate::tracking::{ChangeTracker, EntityState, TrackedEntry};

/// Audit action for a classified entry, or `None` if the entry is not written.
#[must_use]
pub const fn action_for(state: EntityState) -> Option<ActionType> {
    match state {
        EntityState::Inserted => Some(ActionType::Insert),
        EntityState::Deleted => Some(ActionType::Delete),
        EntityState::Updated => Some(ActionType::Update),
        EntityState::Unchanged | EntityState::Detached => None,
    }
}

/// Force a dirty check, then return every auditable entry that will be
/// written, paired with its action.
///
/// Entries whose entity lacks the auditable capability are skipped silently.
///
/// # Errors
///
/// Returns `Detection` if the dirty check fails.
pub fn detect(tracker: &mut ChangeTracker) -> Result<Vec<(&TrackedEntry, ActionType)>> {
    tracker.detect_changes()?;

    Ok(tracker
        .entries()
        .filter(|entry| entry.entity().as_auditable().is_some())
        .filter_map(|entry| action_for(entry.state()).map(|action| (entry, action)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::{FieldValue, Vehicle};
    use crate::tracking::{Entity, EntitySchema, FieldDef};
    use std::any::Any;

    /// Plain entity without the auditable capability.
    #[derive(Debug)]
    struct Note {
        id: Option<i64>,
        body: String,
    }

    static NOTE_SCHEMA: EntitySchema = EntitySchema {
        name: "Note",
        table: "Note",
        key: "id",
        fields: &[FieldDef::generated("id"), FieldDef::plain("body")],
    };

    impl Entity for Note {
        fn schema(&self) -> &'static EntitySchema {
            &NOTE_SCHEMA
        }
        fn get(&self, field: &str) -> Option<FieldValue> {
            match field {
                "id" => Some(self.id.into()),
                "body" => Some(self.body.clone().into()),
                _ => None,
            }
        }
        fn set(&mut self, field: &str, _value: FieldValue) -> Result<()> {
            Err(Error::Other(format!("read-only: {field}")))
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn stored(id: i64) -> Vehicle {
        Vehicle {
            id: Some(id),
            ..Vehicle::new("car", "red")
        }
    }

    #[test]
    fn test_action_mapping() {
        assert_eq!(action_for(EntityState::Inserted), Some(ActionType::Insert));
        assert_eq!(action_for(EntityState::Updated), Some(ActionType::Update));
        assert_eq!(action_for(EntityState::Deleted), Some(ActionType::Delete));
        assert_eq!(action_for(EntityState::Unchanged), None);
        assert_eq!(action_for(EntityState::Detached), None);
    }

    #[test]
    fn test_non_auditable_entities_are_skipped() {
        let mut tracker = ChangeTracker::new();
        tracker.add(Note {
            id: None,
            body: "hello".into(),
        });
        let stored_note = tracker
            .attach(Note {
                id: Some(1),
                body: "bye".into(),
            })
            .unwrap();
        tracker.remove(stored_note).unwrap();

        assert!(detect(&mut tracker).unwrap().is_empty());
    }

    #[test]
    fn test_unchanged_and_detached_are_skipped() {
        let mut tracker = ChangeTracker::new();
        tracker.attach(stored(1)).unwrap();
        let detached = tracker.attach(stored(2)).unwrap();
        tracker.detach(detached).unwrap();

        assert!(detect(&mut tracker).unwrap().is_empty());
    }

    #[test]
    fn test_detect_forces_dirty_check() {
        let mut tracker = ChangeTracker::new();
        let id = tracker.attach(stored(1)).unwrap();
        tracker.get_mut::<Vehicle>(id).unwrap().owner = Some("alice".into());

        let detected = detect(&mut tracker).unwrap();
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].1, ActionType::Update);
        assert_eq!(detected[0].0.id(), id);
    }

    #[test]
    fn test_mixed_batch() {
        let mut tracker = ChangeTracker::new();
        tracker.add(Vehicle::new("car", "red"));
        let gone = tracker.attach(stored(3)).unwrap();
        tracker.remove(gone).unwrap();
        tracker.add(Note {
            id: None,
            body: "skip".into(),
        });

        let actions: Vec<_> = detect(&mut tracker)
            .unwrap()
            .into_iter()
            .map(|(_, action)| action)
            .collect();
        assert_eq!(actions, vec![ActionType::Insert, ActionType::Delete]);
    }
}
