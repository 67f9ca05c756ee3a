//! Change auditing for the unit of work.
//!
//! # Submodules
//!
//! - [`actor`] - Injected actor identity
//! - [`detector`] - Which tracked entries get audited
//! - [`recorder`] - Builds audit drafts before the commit
//! - [`record`] - Draft and resolved audit records
//! - [`codec`] - Encoding of the `changes` column
//! - [`orchestrator`] - The two-phase audited save

pub mod actor;
pub mod codec;
pub mod detector;
pub mod orchestrator;
pub mod record;
pub mod recorder;

pub use actor::{resolve_actor, ActorProvider, UNAUTHENTICATED};
pub use codec::{decode_changes, encode_changes};
pub use orchestrator::{AuditContext, CancellationToken, SavePhase, SaveReport};
pub use record::{ActionType, AuditDraft, AuditRecord, PendingField};
pub use recorder::AuditRecorder;
