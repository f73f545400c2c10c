use serde::Serialize;
use serde_json::json;

use super::conflict::Conflict;
use super::model::SectionKey;
use super::reconcile::OperationFailure;
use super::validate::ValidationError;

/// Failures raised by the scheduling engine.
///
/// Every variant maps to a stable `code()` used in the IPC error envelope.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulingError {
    #[error("invalid time format: {input:?} (expected \"H:MM AM\" or \"H:MM PM\")")]
    InvalidTimeFormat { input: String },

    #[error("schedule is invalid: {}", join_messages(.0))]
    Validation(Vec<ValidationError>),

    #[error("{}", join_conflicts(.0))]
    Conflict(Vec<Conflict>),

    #[error("section {key} is already assigned to teacher {holder}")]
    SectionTaken { key: SectionKey, holder: String },

    #[error("teacher {teacher_id} is not assigned to {key}")]
    NotAssigned { key: SectionKey, teacher_id: String },

    #[error("unknown subject: {0}")]
    UnknownSubject(String),

    #[error("stored assignment {key} is unreadable: {reason}")]
    UnreadableRecord { key: SectionKey, reason: String },

    #[error("{}", partial_message(.added, .removed, .failures))]
    PartialReconciliation {
        added: usize,
        removed: usize,
        unchanged: usize,
        failures: Vec<OperationFailure>,
    },
}

impl SchedulingError {
    pub fn code(&self) -> &'static str {
        match self {
            SchedulingError::InvalidTimeFormat { .. } => "invalid_time_format",
            SchedulingError::Validation(_) => "validation_failed",
            SchedulingError::Conflict(_) => "conflict",
            SchedulingError::SectionTaken { .. } => "section_taken",
            SchedulingError::NotAssigned { .. } => "not_assigned",
            SchedulingError::UnknownSubject(_) => "unknown_subject",
            SchedulingError::UnreadableRecord { .. } => "unreadable_record",
            SchedulingError::PartialReconciliation { .. } => "partial_failure",
        }
    }

    /// Structured payload for the IPC `details` field.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            SchedulingError::InvalidTimeFormat { input } => Some(json!({ "input": input })),
            SchedulingError::Validation(errors) => Some(json!({
                "errors": to_json(errors),
                "messages": errors.iter().map(|e| e.message.clone()).collect::<Vec<_>>(),
            })),
            SchedulingError::Conflict(conflicts) => Some(json!({
                "conflicts": conflicts.iter().map(|c| c.message.clone()).collect::<Vec<_>>(),
                "details": to_json(conflicts),
            })),
            SchedulingError::SectionTaken { key, holder } => Some(json!({
                "subjectId": key.subject_id,
                "sectionId": key.section_id,
                "teacherId": holder,
            })),
            SchedulingError::NotAssigned { key, teacher_id } => Some(json!({
                "subjectId": key.subject_id,
                "sectionId": key.section_id,
                "teacherId": teacher_id,
            })),
            SchedulingError::UnknownSubject(id) => Some(json!({ "subjectId": id })),
            SchedulingError::UnreadableRecord { key, reason } => Some(json!({
                "subjectId": key.subject_id,
                "sectionId": key.section_id,
                "reason": reason,
            })),
            SchedulingError::PartialReconciliation {
                added,
                removed,
                unchanged,
                failures,
            } => Some(json!({
                "added": added,
                "removed": removed,
                "unchanged": unchanged,
                "failures": to_json(failures),
                "summary": partial_summary(*added, *removed, failures),
            })),
        }
    }
}

fn to_json<T: Serialize>(v: &T) -> serde_json::Value {
    serde_json::to_value(v).unwrap_or(serde_json::Value::Null)
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_conflicts(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

fn partial_message(added: &usize, removed: &usize, failures: &[OperationFailure]) -> String {
    partial_summary(*added, *removed, failures)
}

pub(crate) fn partial_summary(added: usize, removed: usize, failures: &[OperationFailure]) -> String {
    let mut out = format!("{} assignments saved, {} removed", added, removed);
    if !failures.is_empty() {
        let listed: Vec<String> = failures.iter().map(|f| f.to_string()).collect();
        out.push_str(&format!(", {} failed: {}", failures.len(), listed.join("; ")));
    }
    out
}
