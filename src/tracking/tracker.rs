//! Unit-of-work change tracker.
//!
//! The tracker owns every entity taking part in the next save, remembers the
//! field values each one had when it was attached (the baseline), and
//! classifies entries by diffing current values against that baseline.
//!
//! Mutations made through [`ChangeTracker::get_mut`] are invisible until
//! [`ChangeTracker::detect_changes`] runs; the state of an attached entity
//! stays `Unchanged` until then.

use crate::error::{Error, Result};
use crate::model::{FieldMap, FieldValue};
use crate::tracking::entity::{snapshot, Entity, FieldDef};
use serde::Serialize;
use std::fmt;
use tracing::{debug, trace};

/// Handle to a tracked entry. Stable for the lifetime of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Classification of a tracked entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    /// No longer tracked; never written.
    Detached,
    /// Matches its baseline.
    Unchanged,
    /// New; will be inserted.
    Inserted,
    /// Differs from its baseline; will be updated.
    Updated,
    /// Will be deleted.
    Deleted,
}

impl EntityState {
    /// Whether the next commit writes this entry.
    #[must_use]
    pub const fn is_pending_write(self) -> bool {
        matches!(self, Self::Inserted | Self::Updated | Self::Deleted)
    }
}

/// One entity under tracking.
#[derive(Debug)]
pub struct TrackedEntry {
    id: EntryId,
    state: EntityState,
    entity: Box<dyn Entity>,
    baseline: FieldMap,
}

impl TrackedEntry {
    #[must_use]
    pub const fn id(&self) -> EntryId {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> EntityState {
        self.state
    }

    #[must_use]
    pub fn entity(&self) -> &dyn Entity {
        self.entity.as_ref()
    }

    pub fn entity_mut(&mut self) -> &mut dyn Entity {
        self.entity.as_mut()
    }

    /// Values captured at attach time or at the last accepted commit.
    #[must_use]
    pub const fn baseline(&self) -> &FieldMap {
        &self.baseline
    }

    /// Current value of a declared field.
    #[must_use]
    pub fn current(&self, field: &str) -> Option<FieldValue> {
        self.entity.get(field)
    }

    /// Whether `field` is storage-assigned and has not been generated yet.
    #[must_use]
    pub fn is_temporary(&self, field: &FieldDef) -> bool {
        field.generated
            && self.state == EntityState::Inserted
            && self.entity.get(field.name).is_none_or(|v| v.is_null())
    }
}

/// Tracks entities for the next save.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    entries: Vec<TrackedEntry>,
}

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new entity; it will be inserted on the next save.
    pub fn add<E: Entity>(&mut self, entity: E) -> EntryId {
        self.push(Box::new(entity), EntityState::Inserted, FieldMap::new())
    }

    /// Track an entity that already exists in storage.
    ///
    /// # Errors
    ///
    /// Returns `Detection` if the entity cannot be snapshotted.
    pub fn attach<E: Entity>(&mut self, entity: E) -> Result<EntryId> {
        let baseline = snapshot(&entity)?;
        Ok(self.push(Box::new(entity), EntityState::Unchanged, baseline))
    }

    fn push(&mut self, entity: Box<dyn Entity>, state: EntityState, baseline: FieldMap) -> EntryId {
        let id = EntryId(self.entries.len());
        trace!(entry = %id, entity = entity.schema().name, ?state, "Tracking entity");
        self.entries.push(TrackedEntry {
            id,
            state,
            entity,
            baseline,
        });
        id
    }

    /// Mark an entry for deletion.
    ///
    /// An entity that was added but never written is simply detached.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unknown or detached entry.
    pub fn remove(&mut self, id: EntryId) -> Result<()> {
        let entry = self.live_entry_mut(id)?;
        entry.state = if entry.state == EntityState::Inserted {
            EntityState::Detached
        } else {
            EntityState::Deleted
        };
        Ok(())
    }

    /// Stop tracking an entry without writing it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unknown entry.
    pub fn detach(&mut self, id: EntryId) -> Result<()> {
        let entry = self.entry_mut(id)?;
        entry.state = EntityState::Detached;
        Ok(())
    }

    /// Typed access to a tracked entity.
    #[must_use]
    pub fn get<E: Entity>(&self, id: EntryId) -> Option<&E> {
        self.entries
            .get(id.0)
            .and_then(|e| e.entity.as_any().downcast_ref::<E>())
    }

    /// Typed mutable access. State is not updated until `detect_changes`.
    pub fn get_mut<E: Entity>(&mut self, id: EntryId) -> Option<&mut E> {
        self.entries
            .get_mut(id.0)
            .and_then(|e| e.entity.as_any_mut().downcast_mut::<E>())
    }

    #[must_use]
    pub fn state(&self, id: EntryId) -> Option<EntityState> {
        self.entries.get(id.0).map(|e| e.state)
    }

    #[must_use]
    pub fn entry(&self, id: EntryId) -> Option<&TrackedEntry> {
        self.entries.get(id.0)
    }

    /// Mutable entry access.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unknown entry.
    pub fn entry_mut(&mut self, id: EntryId) -> Result<&mut TrackedEntry> {
        self.entries
            .get_mut(id.0)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown tracked entry {id}")))
    }

    fn live_entry_mut(&mut self, id: EntryId) -> Result<&mut TrackedEntry> {
        let entry = self.entry_mut(id)?;
        if entry.state == EntityState::Detached {
            return Err(Error::InvalidArgument(format!("tracked entry {id} is detached")));
        }
        Ok(entry)
    }

    /// All entries, detached ones included.
    pub fn entries(&self) -> impl Iterator<Item = &TrackedEntry> {
        self.entries.iter()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut TrackedEntry> {
        self.entries.iter_mut()
    }

    /// Whether the next commit has anything to write. Reflects the last
    /// dirty check only.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.entries.iter().any(|e| e.state.is_pending_write())
    }

    /// Dirty check: diff every unchanged or updated entry against its baseline.
    ///
    /// Returns the number of entries classified as updated afterwards.
    ///
    /// # Errors
    ///
    /// Returns `Detection` if an entity cannot produce a declared field or a
    /// stored entity's key differs from its baseline.
    pub fn detect_changes(&mut self) -> Result<usize> {
        let mut updated = 0;
        for entry in &mut self.entries {
            if !matches!(entry.state, EntityState::Unchanged | EntityState::Updated) {
                continue;
            }

            let current = snapshot(entry.entity.as_ref())?;
            let key = entry.entity.schema().key;
            if current.get(key) != entry.baseline.get(key) {
                return Err(Error::Detection(format!(
                    "{} entry {} changed its key '{key}' from {} to {}",
                    entry.entity.schema().name,
                    entry.id,
                    entry.baseline.get(key).map_or_else(String::new, ToString::to_string),
                    current.get(key).map_or_else(String::new, ToString::to_string),
                )));
            }
            entry.state = if current == entry.baseline {
                EntityState::Unchanged
            } else {
                updated += 1;
                EntityState::Updated
            };
        }

        debug!(updated, tracked = self.entries.len(), "Detected changes");
        Ok(updated)
    }

    /// Mark everything as persisted after a successful commit.
    ///
    /// Inserted and updated entries become unchanged with a fresh baseline;
    /// deleted entries become detached.
    ///
    /// # Errors
    ///
    /// Returns `Detection` if an entity cannot be snapshotted.
    pub fn accept_all_changes(&mut self) -> Result<()> {
        for entry in &mut self.entries {
            match entry.state {
                EntityState::Inserted | EntityState::Updated => {
                    entry.baseline = snapshot(entry.entity.as_ref())?;
                    entry.state = EntityState::Unchanged;
                }
                EntityState::Deleted => entry.state = EntityState::Detached,
                EntityState::Unchanged | EntityState::Detached => {}
            }
        }
        Ok(())
    }
}
