//! Teacher load scheduling engine: time model, assignment records, conflict
//! detection, reconciliation and point mutations. Everything here is pure and
//! synchronous; persistence lives in `db` and transport in `ipc`.

pub mod config;
pub mod conflict;
pub mod error;
pub mod model;
pub mod mutator;
pub mod reconcile;
pub mod store;
pub mod time;
pub mod validate;

pub use config::SchedulingConfig;
pub use conflict::{detect_conflicts_by_day, ConflictPolicy, Proposal};
pub use error::SchedulingError;
pub use model::{AssignmentRecord, Schedule, Section, SectionKey, Subject};
pub use mutator::{
    add_assignment, remove_assignment, reset_schedule, update_schedule, MutationOutcome,
};
pub use reconcile::{
    apply_plan, desired_from_selection, plan_for_teacher, ApplyContext, OperationFailure,
    SectionsBySubject,
};
pub use store::StoreView;
pub use time::ClockTime;
pub use validate::{validate_schedule, ScheduleDraft};
