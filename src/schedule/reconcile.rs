//! Diffing a teacher's desired (subject, section) selection against what the
//! store currently holds, and applying the difference.
//!
//! Removals always run before additions so a teacher moved between two
//! overlapping slots in one edit does not trip over their own old booking.
//! Each operation commits on its own; a failed one is reported and skipped,
//! never rolled back into the others.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info, warn};

use super::config::SchedulingConfig;
use super::conflict::{detect_in_index, Proposal};
use super::error::{partial_summary, SchedulingError};
use super::model::{AssignmentRecord, Schedule, Section, SectionKey, Subject};
use super::mutator::{add_assignment, record_at, remove_assignment, restore_record, MutationOutcome};
use super::store::{sections_assigned_to_teacher, BookingIndex, StoreView};
use super::validate::ensure_valid;

pub type SectionsBySubject = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilePlan {
    pub teacher_id: String,
    pub to_add: Vec<SectionKey>,
    pub to_remove: Vec<SectionKey>,
    pub unchanged: usize,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Per-subject set difference. Subjects present on either side are visited;
/// a subject missing from `desired` loses all of its current sections.
pub fn reconcile(
    teacher_id: &str,
    desired: &SectionsBySubject,
    current: &SectionsBySubject,
) -> ReconcilePlan {
    let empty = BTreeSet::new();
    let subjects: BTreeSet<&String> = desired.keys().chain(current.keys()).collect();

    let mut plan = ReconcilePlan {
        teacher_id: teacher_id.to_string(),
        ..ReconcilePlan::default()
    };
    for subject_id in subjects {
        let want = desired.get(subject_id).unwrap_or(&empty);
        let have = current.get(subject_id).unwrap_or(&empty);
        plan.to_add.extend(
            want.difference(have)
                .map(|section_id| SectionKey::new(subject_id.as_str(), section_id.as_str())),
        );
        plan.to_remove.extend(
            have.difference(want)
                .map(|section_id| SectionKey::new(subject_id.as_str(), section_id.as_str())),
        );
        plan.unchanged += want.intersection(have).count();
    }
    plan
}

/// Plans against the teacher's current holdings in `subjects`.
pub fn plan_for_teacher(
    subjects: &[Subject],
    teacher_id: &str,
    desired: &SectionsBySubject,
) -> ReconcilePlan {
    let current = sections_assigned_to_teacher(subjects, teacher_id);
    reconcile(teacher_id, desired, &current)
}

/// Builds the desired map from a UI selection: every chosen subject gets
/// `section_ids`, unless `per_subject` names its own subset.
pub fn desired_from_selection(
    subject_ids: &[String],
    section_ids: &[String],
    per_subject: &SectionsBySubject,
) -> SectionsBySubject {
    let shared: BTreeSet<String> = section_ids.iter().cloned().collect();
    let mut out = SectionsBySubject::new();
    for subject_id in subject_ids {
        let sections = per_subject
            .get(subject_id)
            .cloned()
            .unwrap_or_else(|| shared.clone());
        out.insert(subject_id.clone(), sections);
    }
    for (subject_id, sections) in per_subject {
        out.entry(subject_id.clone())
            .or_insert_with(|| sections.clone());
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationFailure {
    pub op: OperationKind,
    pub subject_id: String,
    pub section_id: String,
    pub code: String,
    pub message: String,
}

impl OperationFailure {
    fn new(op: OperationKind, key: &SectionKey, code: &str, message: impl Into<String>) -> Self {
        Self {
            op,
            subject_id: key.subject_id.clone(),
            section_id: key.section_id.clone(),
            code: code.to_string(),
            message: message.into(),
        }
    }

    fn from_error(op: OperationKind, key: &SectionKey, e: &SchedulingError) -> Self {
        Self::new(op, key, e.code(), e.to_string())
    }

    /// An addition refused before the pass started, e.g. its schedule draft
    /// did not validate.
    pub fn rejected_add(key: &SectionKey, e: &SchedulingError) -> Self {
        Self::from_error(OperationKind::Add, key, e)
    }
}

impl fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            OperationKind::Add => "add",
            OperationKind::Remove => "remove",
        };
        write!(
            f,
            "{} {}/{}: {}",
            op, self.subject_id, self.section_id, self.message
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub teacher_id: String,
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub failures: Vec<OperationFailure>,
}

impl ReconcileReport {
    pub fn summary(&self) -> String {
        if self.added == 0 && self.removed == 0 && self.failures.is_empty() {
            return "no changes".to_string();
        }
        partial_summary(self.added, self.removed, &self.failures)
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// `PartialReconciliation` when any operation failed.
    pub fn into_result(self) -> Result<Self, SchedulingError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(SchedulingError::PartialReconciliation {
                added: self.added,
                removed: self.removed,
                unchanged: self.unchanged,
                failures: self.failures,
            })
        }
    }
}

/// Inputs for applying a plan beyond the plan itself.
pub struct ApplyContext<'a> {
    pub sections: Option<&'a [Section]>,
    /// Schedules to attach to specific additions.
    pub schedules: &'a HashMap<SectionKey, Schedule>,
    pub config: &'a SchedulingConfig,
}

/// Applies `plan` to `subjects`: all removals, then all additions.
///
/// `commit` persists one subject after each successful mutation. When it
/// fails the in-memory slot is restored and the operation is reported as
/// failed. Additions that carry a schedule are validated and conflict-checked
/// against the state left by every earlier operation in the pass.
pub fn apply_plan<F>(
    subjects: &mut [Subject],
    plan: &ReconcilePlan,
    ctx: &ApplyContext<'_>,
    mut commit: F,
) -> ReconcileReport
where
    F: FnMut(&Subject) -> anyhow::Result<()>,
{
    let teacher_id = plan.teacher_id.as_str();
    let mut report = ReconcileReport {
        teacher_id: teacher_id.to_string(),
        unchanged: plan.unchanged,
        ..ReconcileReport::default()
    };

    let (mut index, labels) = {
        let view = match ctx.sections {
            Some(sections) => StoreView::with_sections(subjects, sections),
            None => StoreView::new(subjects),
        };
        let labels: HashMap<String, String> = ctx
            .sections
            .unwrap_or_default()
            .iter()
            .map(|s| (s.id.clone(), s.name.clone()))
            .collect();
        (BookingIndex::build(&view), labels)
    };
    debug!(teacher = teacher_id, bookings = index.len(), "booking index built");
    let label = |id: &str| labels.get(id).cloned().unwrap_or_else(|| id.to_string());

    for key in &plan.to_remove {
        let previous = record_at(subjects, key).cloned();
        match remove_assignment(subjects, key, teacher_id) {
            Ok(outcome) if outcome.changed() => {
                match persist(subjects, key, previous, &mut commit) {
                    Ok(()) => {
                        index.remove(key);
                        if let Some(rec) = record_at(subjects, key) {
                            index.upsert(key, &subject_name(subjects, key), rec);
                        }
                        report.removed += 1;
                    }
                    Err(f) => report.failures.push(OperationFailure { op: OperationKind::Remove, ..f }),
                }
            }
            Ok(_) => {}
            Err(e) => report
                .failures
                .push(OperationFailure::from_error(OperationKind::Remove, key, &e)),
        }
    }

    for key in &plan.to_add {
        if let Some(sections) = ctx.sections {
            if !sections.iter().any(|s| s.id == key.section_id) {
                report.failures.push(OperationFailure::new(
                    OperationKind::Add,
                    key,
                    "unknown_section",
                    format!("unknown section: {}", key.section_id),
                ));
                continue;
            }
        }

        let schedule = ctx.schedules.get(key).cloned();
        if let Some(s) = &schedule {
            if let Err(e) = ensure_valid(s, ctx.config) {
                report
                    .failures
                    .push(OperationFailure::from_error(OperationKind::Add, key, &e));
                continue;
            }
            let proposal = Proposal::from_schedule(teacher_id, s);
            let checked = detect_in_index(&proposal, key, &index, label, ctx.config.conflict_policy)
                .and_then(|conflicts| {
                    if conflicts.is_empty() {
                        Ok(())
                    } else {
                        Err(SchedulingError::Conflict(conflicts))
                    }
                });
            if let Err(e) = checked {
                report
                    .failures
                    .push(OperationFailure::from_error(OperationKind::Add, key, &e));
                continue;
            }
        }

        let previous = record_at(subjects, key).cloned();
        match add_assignment(subjects, key, teacher_id, schedule) {
            Ok(outcome) if outcome.changed() => {
                match persist(subjects, key, previous, &mut commit) {
                    Ok(()) => {
                        if let Some(rec) = record_at(subjects, key) {
                            index.upsert(key, &subject_name(subjects, key), rec);
                        }
                        report.added += 1;
                    }
                    Err(f) => report.failures.push(OperationFailure { op: OperationKind::Add, ..f }),
                }
            }
            Ok(MutationOutcome::AlreadyAssigned) => report.unchanged += 1,
            Ok(_) => {}
            Err(e) => report
                .failures
                .push(OperationFailure::from_error(OperationKind::Add, key, &e)),
        }
    }

    if report.is_partial() {
        warn!(teacher = teacher_id, failed = report.failures.len(), "{}", report.summary());
    } else {
        info!(teacher = teacher_id, "{}", report.summary());
    }
    report
}

fn subject_name(subjects: &[Subject], key: &SectionKey) -> String {
    subjects
        .iter()
        .find(|s| s.id == key.subject_id)
        .map(|s| s.name.clone())
        .unwrap_or_else(|| key.subject_id.clone())
}

fn persist<F>(
    subjects: &mut [Subject],
    key: &SectionKey,
    previous: Option<AssignmentRecord>,
    commit: &mut F,
) -> Result<(), OperationFailure>
where
    F: FnMut(&Subject) -> anyhow::Result<()>,
{
    let result = match subjects.iter().find(|s| s.id == key.subject_id) {
        Some(subject) => commit(subject),
        None => Ok(()),
    };
    result.map_err(|e| {
        restore_record(subjects, key, previous);
        warn!(subject = %key.subject_id, section = %key.section_id, error = %e, "commit failed");
        OperationFailure::new(OperationKind::Add, key, "db_update_failed", e.to_string())
    })
}
