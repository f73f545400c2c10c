//! Point mutations on one `(subject, section)` slot.
//!
//! Every write produces the current record shape. Legacy teacher lists are
//! only ever read, narrowed, or upgraded.

use serde::Serialize;
use tracing::{info, warn};

use super::config::SchedulingConfig;
use super::conflict::{detect_conflicts_with, Proposal};
use super::error::SchedulingError;
use super::model::{AssignmentRecord, Schedule, ScheduledAssignment, Section, SectionKey, Subject};
use super::store::StoreView;
use super::validate::ensure_valid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationOutcome {
    Assigned,
    AlreadyAssigned,
    Removed,
    NotPresent,
    ScheduleUpdated,
    ScheduleUnchanged,
    ScheduleCleared,
    AlreadyUnscheduled,
}

impl MutationOutcome {
    /// Whether the subject needs to be written back.
    pub fn changed(self) -> bool {
        matches!(
            self,
            MutationOutcome::Assigned
                | MutationOutcome::Removed
                | MutationOutcome::ScheduleUpdated
                | MutationOutcome::ScheduleCleared
        )
    }
}

pub(crate) fn subject_mut<'a>(
    subjects: &'a mut [Subject],
    subject_id: &str,
) -> Result<&'a mut Subject, SchedulingError> {
    subjects
        .iter_mut()
        .find(|s| s.id == subject_id)
        .ok_or_else(|| SchedulingError::UnknownSubject(subject_id.to_string()))
}

/// Assigns `teacher_id` to the slot, optionally with a schedule that the
/// caller has already validated and conflict-checked.
///
/// Refuses when another teacher holds the slot. A legacy list naming only
/// this teacher is upgraded in place.
pub fn add_assignment(
    subjects: &mut [Subject],
    key: &SectionKey,
    teacher_id: &str,
    schedule: Option<Schedule>,
) -> Result<MutationOutcome, SchedulingError> {
    let subject = subject_mut(subjects, &key.subject_id)?;
    let slot = subject.teacher_assignments.get(&key.section_id);

    let outcome = match slot {
        None => MutationOutcome::Assigned,
        Some(AssignmentRecord::LegacyTeacherList(ids)) if ids.is_empty() => {
            MutationOutcome::Assigned
        }
        Some(AssignmentRecord::LegacyTeacherList(ids)) => {
            if let Some(holder) = ids.iter().find(|t| *t != teacher_id) {
                return Err(SchedulingError::SectionTaken {
                    key: key.clone(),
                    holder: holder.clone(),
                });
            }
            MutationOutcome::AlreadyAssigned
        }
        Some(AssignmentRecord::Scheduled(a)) if a.teacher_id != teacher_id => {
            return Err(SchedulingError::SectionTaken {
                key: key.clone(),
                holder: a.teacher_id.clone(),
            });
        }
        Some(AssignmentRecord::Scheduled(a)) => {
            if schedule.is_none() || a.schedule == schedule {
                return Ok(MutationOutcome::AlreadyAssigned);
            }
            MutationOutcome::ScheduleUpdated
        }
        Some(AssignmentRecord::Unreadable(u)) => match u.teacher_id() {
            Some(holder) if holder == teacher_id => {
                if schedule.is_none() {
                    return Ok(MutationOutcome::AlreadyAssigned);
                }
                MutationOutcome::ScheduleUpdated
            }
            Some(holder) => {
                return Err(SchedulingError::SectionTaken {
                    key: key.clone(),
                    holder: holder.to_string(),
                });
            }
            None => return Err(u.error(key)),
        },
    };

    let keep = match (&schedule, slot) {
        (None, Some(rec)) => rec.schedule().cloned(),
        _ => None,
    };
    subject.teacher_assignments.insert(
        key.section_id.clone(),
        AssignmentRecord::Scheduled(ScheduledAssignment {
            teacher_id: teacher_id.to_string(),
            schedule: schedule.or(keep),
        }),
    );
    info!(teacher = teacher_id, subject = %key.subject_id, section = %key.section_id, ?outcome, "assignment added");
    // Upgrading a legacy list still counts as a write even though the
    // teacher was already there.
    Ok(if outcome == MutationOutcome::AlreadyAssigned {
        MutationOutcome::Assigned
    } else {
        outcome
    })
}

/// Drops `teacher_id` from the slot. Absent records, unknown subjects, and
/// slots held by someone else are no-ops.
pub fn remove_assignment(
    subjects: &mut [Subject],
    key: &SectionKey,
    teacher_id: &str,
) -> Result<MutationOutcome, SchedulingError> {
    let Ok(subject) = subject_mut(subjects, &key.subject_id) else {
        warn!(subject = %key.subject_id, "remove skipped: subject not found");
        return Ok(MutationOutcome::NotPresent);
    };

    let next = match subject.teacher_assignments.get(&key.section_id) {
        None => return Ok(MutationOutcome::NotPresent),
        Some(rec) if !rec.names_teacher(teacher_id) => {
            warn!(teacher = teacher_id, subject = %key.subject_id, section = %key.section_id, "remove skipped: slot held by another teacher");
            return Ok(MutationOutcome::NotPresent);
        }
        Some(AssignmentRecord::Scheduled(_) | AssignmentRecord::Unreadable(_)) => None,
        Some(AssignmentRecord::LegacyTeacherList(ids)) => {
            let rest: Vec<String> = ids.iter().filter(|t| *t != teacher_id).cloned().collect();
            match rest.len() {
                0 => None,
                1 => Some(AssignmentRecord::new(rest[0].clone())),
                _ => Some(AssignmentRecord::LegacyTeacherList(rest)),
            }
        }
    };

    match next {
        Some(rec) => {
            subject.teacher_assignments.insert(key.section_id.clone(), rec);
        }
        None => {
            subject.teacher_assignments.remove(&key.section_id);
        }
    }
    info!(teacher = teacher_id, subject = %key.subject_id, section = %key.section_id, "assignment removed");
    Ok(MutationOutcome::Removed)
}

/// Replaces the slot's schedule wholesale after validation and a clean
/// conflict scan that excludes the slot itself.
pub fn update_schedule(
    subjects: &mut [Subject],
    sections: Option<&[Section]>,
    key: &SectionKey,
    teacher_id: &str,
    schedule: Schedule,
    config: &SchedulingConfig,
) -> Result<MutationOutcome, SchedulingError> {
    ensure_valid(&schedule, config)?;
    require_holder(subjects, key, teacher_id)?;
    if let Some(AssignmentRecord::LegacyTeacherList(ids)) = record_at(subjects, key) {
        if let Some(holder) = ids.iter().find(|t| *t != teacher_id) {
            return Err(SchedulingError::SectionTaken {
                key: key.clone(),
                holder: holder.clone(),
            });
        }
    }

    let conflicts = {
        let view = match sections {
            Some(sections) => StoreView::with_sections(subjects, sections),
            None => StoreView::new(subjects),
        };
        let proposal = Proposal::from_schedule(teacher_id, &schedule);
        detect_conflicts_with(&proposal, key, &view, config.conflict_policy)?
    };
    if !conflicts.is_empty() {
        return Err(SchedulingError::Conflict(conflicts));
    }

    let subject = subject_mut(subjects, &key.subject_id)?;
    if let Some(AssignmentRecord::Scheduled(a)) = subject.teacher_assignments.get(&key.section_id) {
        if a.schedule.as_ref() == Some(&schedule) {
            return Ok(MutationOutcome::ScheduleUnchanged);
        }
    }
    subject.teacher_assignments.insert(
        key.section_id.clone(),
        AssignmentRecord::with_schedule(teacher_id, schedule),
    );
    info!(teacher = teacher_id, subject = %key.subject_id, section = %key.section_id, "schedule updated");
    Ok(MutationOutcome::ScheduleUpdated)
}

/// Clears the schedule but keeps the teacher on the section. An unreadable
/// record held by the teacher is rewritten as an unscheduled one.
pub fn reset_schedule(
    subjects: &mut [Subject],
    key: &SectionKey,
    teacher_id: &str,
) -> Result<MutationOutcome, SchedulingError> {
    require_holder(subjects, key, teacher_id)?;
    let subject = subject_mut(subjects, &key.subject_id)?;
    match subject.teacher_assignments.get_mut(&key.section_id) {
        Some(AssignmentRecord::Scheduled(a)) if a.schedule.is_some() => {
            a.schedule = None;
            info!(teacher = teacher_id, subject = %key.subject_id, section = %key.section_id, "schedule cleared");
            Ok(MutationOutcome::ScheduleCleared)
        }
        Some(rec @ AssignmentRecord::Unreadable(_)) => {
            *rec = AssignmentRecord::new(teacher_id);
            info!(teacher = teacher_id, subject = %key.subject_id, section = %key.section_id, "unreadable schedule cleared");
            Ok(MutationOutcome::ScheduleCleared)
        }
        _ => Ok(MutationOutcome::AlreadyUnscheduled),
    }
}

/// Puts a slot back to `previous`, used when persisting a mutation failed.
pub fn restore_record(
    subjects: &mut [Subject],
    key: &SectionKey,
    previous: Option<AssignmentRecord>,
) {
    let Ok(subject) = subject_mut(subjects, &key.subject_id) else {
        return;
    };
    match previous {
        Some(rec) => {
            subject.teacher_assignments.insert(key.section_id.clone(), rec);
        }
        None => {
            subject.teacher_assignments.remove(&key.section_id);
        }
    }
}

pub fn record_at<'a>(subjects: &'a [Subject], key: &SectionKey) -> Option<&'a AssignmentRecord> {
    subjects
        .iter()
        .find(|s| s.id == key.subject_id)
        .and_then(|s| s.teacher_assignments.get(&key.section_id))
}

fn require_holder(
    subjects: &[Subject],
    key: &SectionKey,
    teacher_id: &str,
) -> Result<(), SchedulingError> {
    if !subjects.iter().any(|s| s.id == key.subject_id) {
        return Err(SchedulingError::UnknownSubject(key.subject_id.clone()));
    }
    match record_at(subjects, key) {
        Some(rec) if rec.names_teacher(teacher_id) => Ok(()),
        _ => Err(SchedulingError::NotAssigned {
            key: key.clone(),
            teacher_id: teacher_id.to_string(),
        }),
    }
}
