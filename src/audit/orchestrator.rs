//! The audited save.
//!
//! [`AuditContext`] owns a store, a change tracker and an actor provider.
//! [`AuditContext::save`] runs the two-phase protocol:
//!
//! 1. **Detecting**: dirty check, then one draft per auditable write
//! 2. **Committing**: the store writes the business changes
//! 3. **Resolving**: drafts pick up storage-generated values
//! 4. **Persisting**: resolved records go to the store in a second write
//!
//! A failed commit stops the save before anything is audited and is returned
//! unchanged. Failures after the commit (resolution, audit persistence) are
//! logged and reported in [`SaveReport::audit_errors`]; the business write
//! stands and the save still succeeds.

use crate::audit::actor::{resolve_actor, ActorProvider};
use crate::audit::detector;
use crate::audit::record::{AuditDraft, AuditRecord};
use crate::audit::recorder::AuditRecorder;
use crate::error::{Error, Result};
use crate::storage::Store;
use crate::tracking::{ChangeTracker, Entity, EntityState, EntryId};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

/// Phase of the save protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    Idle,
    Detecting,
    Committing,
    Resolving,
    Persisting,
    /// The last commit failed.
    Failed,
}

/// Cooperative cancellation, honored between detection and commit only.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a successful business commit.
#[derive(Debug)]
pub struct SaveReport {
    /// Rows written by the business commit.
    pub rows_written: usize,
    /// Audit records persisted by this save, ids assigned.
    pub audited: Vec<AuditRecord>,
    /// Post-commit audit failures. Never affects `rows_written`.
    pub audit_errors: Vec<Error>,
}

impl SaveReport {
    /// Whether every detected mutation was audited.
    #[must_use]
    pub fn is_fully_audited(&self) -> bool {
        self.audit_errors.is_empty()
    }
}

/// Unit of work with auditing.
pub struct AuditContext<S: Store> {
    store: S,
    tracker: ChangeTracker,
    actor: Box<dyn ActorProvider>,
    phase: SavePhase,
}

impl<S: Store> AuditContext<S> {
    /// Create a context over `store`; `actor` is read once per save.
    pub fn new(store: S, actor: impl ActorProvider + 'static) -> Self {
        Self {
            store,
            tracker: ChangeTracker::new(),
            actor: Box::new(actor),
            phase: SavePhase::Idle,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> SavePhase {
        self.phase
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    #[must_use]
    pub const fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ChangeTracker {
        &mut self.tracker
    }

    /// Track a new entity for insertion.
    pub fn add<E: Entity>(&mut self, entity: E) -> EntryId {
        self.tracker.add(entity)
    }

    /// Track an entity loaded from storage.
    ///
    /// # Errors
    ///
    /// Returns `Detection` if the entity cannot be snapshotted.
    pub fn attach<E: Entity>(&mut self, entity: E) -> Result<EntryId> {
        self.tracker.attach(entity)
    }

    /// Mark an entity for deletion.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for unknown or detached entries.
    pub fn remove(&mut self, id: EntryId) -> Result<()> {
        self.tracker.remove(id)
    }

    #[must_use]
    pub fn get<E: Entity>(&self, id: EntryId) -> Option<&E> {
        self.tracker.get(id)
    }

    pub fn get_mut<E: Entity>(&mut self, id: EntryId) -> Option<&mut E> {
        self.tracker.get_mut(id)
    }

    #[must_use]
    pub fn state(&self, id: EntryId) -> Option<EntityState> {
        self.tracker.state(id)
    }

    /// Commit every tracked change and audit it.
    ///
    /// # Errors
    ///
    /// Returns `Detection` if the dirty check fails, or the store's own error
    /// if the business commit fails. Audit-side failures are reported in the
    /// returned [`SaveReport`] instead.
    pub fn save(&mut self) -> Result<SaveReport> {
        self.run_save(None)
    }

    /// Like [`save`](Self::save), but gives up before the commit if `token`
    /// has been cancelled.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` when cancelled; otherwise as [`save`](Self::save).
    pub fn save_with_cancel(&mut self, token: &CancellationToken) -> Result<SaveReport> {
        self.run_save(Some(token))
    }

    fn run_save(&mut self, cancel: Option<&CancellationToken>) -> Result<SaveReport> {
        let op = uuid::Uuid::new_v4();
        let span = info_span!("save", op = %op);
        let _guard = span.enter();

        self.phase = SavePhase::Detecting;
        let drafts = match self.build_drafts() {
            Ok(drafts) => drafts,
            Err(e) => {
                self.phase = SavePhase::Idle;
                return Err(e);
            }
        };
        debug!(drafts = drafts.len(), "Captured audit drafts");

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            self.phase = SavePhase::Idle;
            info!("Save cancelled before commit");
            return Err(Error::Cancelled);
        }

        self.phase = SavePhase::Committing;
        let rows_written = match self.store.commit(&mut self.tracker) {
            Ok(rows) => rows,
            Err(e) => {
                self.phase = SavePhase::Failed;
                warn!(error = %e, discarded = drafts.len(), "Commit failed, nothing audited");
                return Err(e);
            }
        };

        self.phase = SavePhase::Resolving;
        let mut audit_errors = Vec::new();
        let mut records = Vec::with_capacity(drafts.len());
        for draft in drafts {
            match draft.resolve(&self.tracker) {
                Ok(record) => records.push(record),
                Err(e) => {
                    error!(error = %e, "Audit record could not be resolved");
                    audit_errors.push(e);
                }
            }
        }

        if let Err(e) = self.tracker.accept_all_changes() {
            error!(error = %e, "Could not accept committed changes");
            audit_errors.push(e);
        }

        self.phase = SavePhase::Persisting;
        if !records.is_empty() {
            match self.store.persist_audit(&mut records) {
                Ok(count) => debug!(count, "Persisted audit records"),
                Err(e) => {
                    error!(error = %e, lost = records.len(), "Audit persistence failed");
                    records.clear();
                    audit_errors.push(Error::AuditPersist(Box::new(e)));
                }
            }
        }

        self.phase = SavePhase::Idle;
        info!(
            rows = rows_written,
            audited = records.len(),
            audit_errors = audit_errors.len(),
            "Save complete"
        );

        Ok(SaveReport {
            rows_written,
            audited: records,
            audit_errors,
        })
    }

    fn build_drafts(&mut self) -> Result<Vec<AuditDraft>> {
        let recorder = AuditRecorder::new(resolve_actor(self.actor.as_ref()), Utc::now());
        detector::detect(&mut self.tracker)?
            .into_iter()
            .map(|(entry, action)| recorder.record(entry, action))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::actor::UNAUTHENTICATED;
    use crate::audit::record::ActionType;
    use crate::model::{FieldValue, Vehicle};
    use crate::storage::SqliteStore;
    use crate::tracking::{Auditable, EntitySchema, FieldDef};
    use std::any::Any;

    /// Auditable entity with a text key, so the integer key storage assigns
    /// is refused on write-back.
    #[derive(Debug)]
    struct Badge {
        id: Option<String>,
        label: String,
    }

    static BADGE_SCHEMA: EntitySchema = EntitySchema {
        name: "Badge",
        table: "Badge",
        key: "id",
        fields: &[FieldDef::generated("id"), FieldDef::plain("label")],
    };

    impl Entity for Badge {
        fn schema(&self) -> &'static EntitySchema {
            &BADGE_SCHEMA
        }
        fn get(&self, field: &str) -> Option<FieldValue> {
            match field {
                "id" => Some(self.id.clone().into()),
                "label" => Some(self.label.clone().into()),
                _ => None,
            }
        }
        fn set(&mut self, field: &str, value: FieldValue) -> Result<()> {
            match (field, value) {
                ("id", FieldValue::Text(id)) => self.id = Some(id),
                ("id", FieldValue::Null) => self.id = None,
                ("label", FieldValue::Text(label)) => self.label = label,
                (_, other) => return Err(Error::InvalidArgument(format!("{other:?}"))),
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

    impl Auditable for Badge {}

    /// Auditable entity whose `status` column is filled by a SQL default.
    #[derive(Debug)]
    struct Ticket {
        id: Option<i64>,
        title: String,
        status: Option<String>,
    }

    static TICKET_SCHEMA: EntitySchema = EntitySchema {
        name: "Ticket",
        table: "Ticket",
        key: "id",
        fields: &[
            FieldDef::generated("id"),
            FieldDef::plain("title"),
            FieldDef::generated("status"),
        ],
    };

    impl Entity for Ticket {
        fn schema(&self) -> &'static EntitySchema {
            &TICKET_SCHEMA
        }
        fn get(&self, field: &str) -> Option<FieldValue> {
            match field {
                "id" => Some(self.id.into()),
                "title" => Some(self.title.clone().into()),
                "status" => Some(self.status.clone().into()),
                _ => None,
            }
        }
        fn set(&mut self, field: &str, value: FieldValue) -> Result<()> {
            match (field, value) {
                ("id", FieldValue::Integer(id)) => self.id = Some(id),
                ("id", FieldValue::Null) => self.id = None,
                ("title", FieldValue::Text(title)) => self.title = title,
                ("status", FieldValue::Text(status)) => self.status = Some(status),
                ("status", FieldValue::Null) => self.status = None,
                (_, other) => return Err(Error::InvalidArgument(format!("{other:?}"))),
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

    impl Auditable for Ticket {}

    const EXTRA_TABLES: &str = "
        CREATE TABLE Badge (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT NOT NULL);
        CREATE TABLE Ticket (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'open'
        );
    ";

    fn extended_context() -> AuditContext<SqliteStore> {
        let store = SqliteStore::open_memory().unwrap();
        store.conn().execute_batch(EXTRA_TABLES).unwrap();
        AuditContext::new(store, None::<String>)
    }

    fn count_rows(ctx: &AuditContext<SqliteStore>, table: &str) -> i64 {
        ctx.store()
            .conn()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    /// Store whose audit write always fails.
    struct BrokenAuditStore(SqliteStore);

    impl Store for BrokenAuditStore {
        fn commit(&mut self, tracker: &mut ChangeTracker) -> Result<usize> {
            self.0.commit(tracker)
        }

        fn persist_audit(&mut self, _records: &mut [AuditRecord]) -> Result<usize> {
            Err(Error::Other("audit table offline".into()))
        }
    }

    fn context(actor: Option<&str>) -> AuditContext<SqliteStore> {
        AuditContext::new(
            SqliteStore::open_memory().unwrap(),
            actor.map(ToString::to_string),
        )
    }

    fn stored_audits(ctx: &AuditContext<SqliteStore>) -> Vec<AuditRecord> {
        ctx.store().list_audit_records(None, None).unwrap()
    }

    #[test]
    fn test_insert_is_audited_with_generated_key() {
        let mut ctx = context(None);
        let id = ctx.add(Vehicle::new("car", "red"));

        let report = ctx.save().unwrap();
        assert_eq!(report.rows_written, 1);
        assert!(report.is_fully_audited());

        let key = ctx.get::<Vehicle>(id).unwrap().id.unwrap();
        let audits = stored_audits(&ctx);
        assert_eq!(audits.len(), 1);

        let audit = &audits[0];
        assert_eq!(audit.action_type, ActionType::Insert);
        assert_eq!(audit.actor, UNAUTHENTICATED);
        assert_eq!(audit.entity_name, "Vehicle");
        assert_eq!(audit.entity_key, key.to_string());
        assert_eq!(audit.value("id"), Some(&FieldValue::Integer(key)));
        assert_eq!(audit.value("type"), Some(&FieldValue::from("car")));
        assert_eq!(audit.value("color"), Some(&FieldValue::from("red")));
        assert_eq!(audit.value("owner"), Some(&FieldValue::Null));
        assert_eq!(audit, &report.audited[0]);
    }

    #[test]
    fn test_update_and_delete_are_audited() {
        let mut ctx = context(None);
        let id = ctx.add(Vehicle::new("car", "red"));
        ctx.save().unwrap();
        let key = ctx.get::<Vehicle>(id).unwrap().id.unwrap();

        // Update as alice through a fresh context over the same store
        let mut ctx = AuditContext::new(ctx.into_store(), Some("alice".to_string()));
        let vehicle = ctx.store().get_vehicle(key).unwrap().unwrap();
        let id = ctx.attach(vehicle).unwrap();
        ctx.get_mut::<Vehicle>(id).unwrap().color = Some("blue".into());
        let report = ctx.save().unwrap();
        assert_eq!(report.rows_written, 1);

        let update = &report.audited[0];
        assert_eq!(update.action_type, ActionType::Update);
        assert_eq!(update.actor, "alice");
        assert_eq!(update.entity_key, key.to_string());
        assert_eq!(update.value("color"), Some(&FieldValue::from("blue")));
        assert_eq!(update.value("type"), Some(&FieldValue::from("car")));

        // Delete
        ctx.remove(id).unwrap();
        let report = ctx.save().unwrap();
        let delete = &report.audited[0];
        assert_eq!(delete.action_type, ActionType::Delete);
        assert_eq!(delete.entity_key, key.to_string());
        assert_eq!(delete.value("color"), Some(&FieldValue::from("blue")));
        assert_eq!(ctx.state(id), Some(EntityState::Detached));
        assert!(ctx.store().get_vehicle(key).unwrap().is_none());

        let audits = ctx.store().get_audit_records("Vehicle", &key.to_string(), None).unwrap();
        assert_eq!(audits.len(), 3);
    }

    #[test]
    fn test_failed_commit_audits_nothing() {
        let mut ctx = context(Some("alice"));
        let mut vehicle = Vehicle::new("car", "red");
        vehicle.model = Some("x".repeat(101));
        let id = ctx.add(vehicle);

        let err = ctx.save().unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        assert!(err.to_string().contains("CHECK constraint failed"));
        assert_eq!(ctx.phase(), SavePhase::Failed);
        assert!(stored_audits(&ctx).is_empty());

        // Nothing was written back into the entity
        assert_eq!(ctx.get::<Vehicle>(id).unwrap().id, None);
        assert_eq!(ctx.state(id), Some(EntityState::Inserted));
    }

    #[test]
    fn test_batch_shares_timestamp() {
        let mut ctx = context(None);
        let a = ctx.add(Vehicle::new("car", "red"));
        let b = ctx.add(Vehicle::new("van", "white"));

        let report = ctx.save().unwrap();
        assert_eq!(report.rows_written, 2);
        assert_eq!(report.audited.len(), 2);

        let first = &report.audited[0];
        let second = &report.audited[1];
        assert_eq!(first.timestamp, second.timestamp);
        assert_ne!(first.entity_key, second.entity_key);
        assert_eq!(
            first.entity_key,
            ctx.get::<Vehicle>(a).unwrap().id.unwrap().to_string()
        );
        assert_eq!(
            second.entity_key,
            ctx.get::<Vehicle>(b).unwrap().id.unwrap().to_string()
        );
    }

    #[test]
    fn test_nothing_to_save() {
        let mut ctx = context(None);
        let report = ctx.save().unwrap();
        assert_eq!(report.rows_written, 0);
        assert!(report.audited.is_empty());
        assert_eq!(ctx.phase(), SavePhase::Idle);
    }

    #[test]
    fn test_unchanged_entity_is_not_audited() {
        let mut ctx = context(None);
        let id = ctx.add(Vehicle::new("car", "red"));
        ctx.save().unwrap();

        let report = ctx.save().unwrap();
        assert_eq!(report.rows_written, 0);
        assert!(report.audited.is_empty());
        assert_eq!(ctx.state(id), Some(EntityState::Unchanged));
        assert_eq!(stored_audits(&ctx).len(), 1);
    }

    #[test]
    fn test_cancelled_save_writes_nothing() {
        let mut ctx = context(None);
        let id = ctx.add(Vehicle::new("car", "red"));
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(ctx.save_with_cancel(&token), Err(Error::Cancelled)));
        assert_eq!(ctx.state(id), Some(EntityState::Inserted));
        assert!(ctx.store().list_vehicles(None).unwrap().is_empty());
        assert!(stored_audits(&ctx).is_empty());

        // A later save still goes through
        assert_eq!(ctx.save().unwrap().rows_written, 1);
    }

    #[test]
    fn test_audit_failure_does_not_fail_save() {
        let store = BrokenAuditStore(SqliteStore::open_memory().unwrap());
        let mut ctx = AuditContext::new(store, None::<String>);
        let id = ctx.add(Vehicle::new("car", "red"));

        let report = ctx.save().unwrap();
        assert_eq!(report.rows_written, 1);
        assert!(report.audited.is_empty());
        assert_eq!(report.audit_errors.len(), 1);
        assert!(matches!(report.audit_errors[0], Error::AuditPersist(_)));

        // Business write stands
        let key = ctx.get::<Vehicle>(id).unwrap().id.unwrap();
        assert!(ctx.store().0.get_vehicle(key).unwrap().is_some());
        assert_eq!(ctx.state(id), Some(EntityState::Unchanged));
    }

    #[test]
    fn test_key_change_is_rejected_before_any_write() {
        let mut ctx = context(None);
        let a = ctx.add(Vehicle::new("car", "red"));
        let b = ctx.add(Vehicle::new("van", "white"));
        ctx.save().unwrap();
        let key_b = ctx.get::<Vehicle>(b).unwrap().id.unwrap();

        // Retargeting onto another stored row
        let vehicle = ctx.get_mut::<Vehicle>(a).unwrap();
        vehicle.id = Some(key_b);
        vehicle.color = Some("green".into());

        let err = ctx.save().unwrap_err();
        assert!(matches!(err, Error::Detection(_)));
        assert_eq!(ctx.phase(), SavePhase::Idle);

        let stored_b = ctx.store().get_vehicle(key_b).unwrap().unwrap();
        assert_eq!(stored_b.kind.as_deref(), Some("van"));
        assert_eq!(stored_b.color.as_deref(), Some("white"));

        // Key-only edit onto a missing row
        let vehicle = ctx.get_mut::<Vehicle>(a).unwrap();
        vehicle.id = Some(99);
        vehicle.color = Some("red".into());
        assert!(matches!(ctx.save(), Err(Error::Detection(_))));
        assert!(ctx.store().get_vehicle(99).unwrap().is_none());

        assert_eq!(stored_audits(&ctx).len(), 2);
    }

    #[test]
    fn test_rejected_generated_value_does_not_fail_save() {
        let mut ctx = extended_context();
        let id = ctx.add(Badge {
            id: None,
            label: "gold".into(),
        });

        let report = ctx.save().unwrap();
        assert_eq!(report.rows_written, 1);
        assert_eq!(ctx.phase(), SavePhase::Idle);
        assert_eq!(ctx.state(id), Some(EntityState::Unchanged));
        assert_eq!(count_rows(&ctx, "Badge"), 1);

        assert!(report.audited.is_empty());
        assert!(matches!(
            report.audit_errors.as_slice(),
            [Error::Resolution { field, .. }] if field == "id"
        ));
        assert!(stored_audits(&ctx).is_empty());
    }

    #[test]
    fn test_unresolved_record_does_not_block_the_batch() {
        let mut ctx = extended_context();
        ctx.add(Badge {
            id: None,
            label: "gold".into(),
        });
        let vehicle = ctx.add(Vehicle::new("car", "red"));

        let report = ctx.save().unwrap();
        assert_eq!(report.rows_written, 2);
        assert!(!report.is_fully_audited());
        assert_eq!(report.audit_errors.len(), 1);
        assert!(matches!(
            report.audit_errors[0],
            Error::Resolution { ref entity, .. } if entity == "Badge"
        ));

        let key = ctx.get::<Vehicle>(vehicle).unwrap().id.unwrap();
        let audits = stored_audits(&ctx);
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].entity_name, "Vehicle");
        assert_eq!(audits[0].entity_key, key.to_string());
        assert_eq!(report.audited, audits);
    }

    #[test]
    fn test_generated_column_resolves_alongside_key() {
        let mut ctx = extended_context();
        let defaulted = ctx.add(Ticket {
            id: None,
            title: "printer jam".into(),
            status: None,
        });
        let explicit = ctx.add(Ticket {
            id: None,
            title: "new laptop".into(),
            status: Some("closed".into()),
        });

        let report = ctx.save().unwrap();
        assert!(report.is_fully_audited());
        assert_eq!(report.audited.len(), 2);

        let ticket = ctx.get::<Ticket>(defaulted).unwrap();
        assert_eq!(ticket.status.as_deref(), Some("open"));
        let record = &report.audited[0];
        assert_eq!(record.entity_key, ticket.id.unwrap().to_string());
        assert_eq!(record.value("status"), Some(&FieldValue::from("open")));
        assert_eq!(record.value("id"), Some(&FieldValue::from(ticket.id)));

        let record = &report.audited[1];
        assert_eq!(
            record.entity_key,
            ctx.get::<Ticket>(explicit).unwrap().id.unwrap().to_string()
        );
        assert_eq!(record.value("status"), Some(&FieldValue::from("closed")));
    }

    #[test]
    fn test_actor_read_once_per_save() {
        use std::cell::Cell;
        use std::rc::Rc;

        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let provider = move || {
            counter.set(counter.get() + 1);
            Some("dave".to_string())
        };

        let mut ctx = AuditContext::new(SqliteStore::open_memory().unwrap(), provider);
        ctx.add(Vehicle::new("car", "red"));
        ctx.add(Vehicle::new("van", "white"));
        let report = ctx.save().unwrap();

        assert_eq!(calls.get(), 1);
        assert!(report.audited.iter().all(|r| r.actor == "dave"));
    }
}
