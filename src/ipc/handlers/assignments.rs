//! Teacher assignment and schedule methods.
//!
//! Each request reloads subjects, sections and settings, mutates in memory,
//! then writes back only the subjects it changed. One subject write is one
//! commit; a reconcile pass commits per operation.

use crate::db;
use crate::ipc::error::{err, ok, scheduling_err, store_err};
use crate::ipc::helpers::{db_conn, required_str, section_key, string_list, Workspace};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{
    add_assignment, apply_plan, desired_from_selection, detect_conflicts_by_day,
    plan_for_teacher, remove_assignment, reset_schedule, update_schedule, validate_schedule,
    ApplyContext, MutationOutcome, OperationFailure, Proposal, Schedule, ScheduleDraft,
    SchedulingError, SectionKey, SectionsBySubject, StoreView,
};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::warn;

fn load_workspace(conn: &Connection, req: &Request) -> Result<Workspace, Value> {
    Workspace::load(conn).map_err(|e| store_err(&req.id, "db_query_failed", e))
}

fn schedule_draft(req: &Request, raw: &Value) -> Result<ScheduleDraft, Value> {
    serde_json::from_value(raw.clone())
        .map_err(|e| err(&req.id, "bad_params", format!("bad schedule: {}", e), None))
}

/// Writes the subject behind `key` if the mutation changed anything.
fn commit_if_changed(
    conn: &Connection,
    ws: &Workspace,
    key: &SectionKey,
    outcome: MutationOutcome,
    req: &Request,
) -> Result<(), Value> {
    if !outcome.changed() {
        return Ok(());
    }
    let Some(subject) = ws.subjects.iter().find(|s| s.id == key.subject_id) else {
        return Ok(());
    };
    db::subject_save_assignments(conn, subject)
        .map_err(|e| store_err(&req.id, "db_update_failed", e))
}

fn handle_list_for_teacher(state: &mut AppState, req: &Request) -> Result<Value, Value> {
    let conn = db_conn(state, req)?;
    let teacher_id = required_str(req, "teacherId")?;
    let ws = load_workspace(conn, req)?;
    let view = StoreView::with_sections(&ws.subjects, &ws.sections);

    let mut subjects = Vec::new();
    for subject in view.subjects() {
        let sections: Vec<Value> = subject
            .teacher_assignments
            .iter()
            .filter(|(section_id, rec)| {
                view.section_exists(section_id) && rec.names_teacher(&teacher_id)
            })
            .map(|(section_id, rec)| {
                json!({
                    "sectionId": section_id,
                    "sectionName": view.section_label(section_id),
                    "legacy": rec.is_legacy(),
                    "unreadable": rec.unreadable().is_some(),
                    "schedule": rec.schedule(),
                })
            })
            .collect();
        if !sections.is_empty() {
            subjects.push(json!({
                "subjectId": subject.id,
                "subjectName": subject.name,
                "sections": sections,
            }));
        }
    }
    Ok(json!({ "teacherId": teacher_id, "subjects": subjects }))
}

fn handle_check_conflicts(state: &mut AppState, req: &Request) -> Result<Value, Value> {
    let conn = db_conn(state, req)?;
    let key = section_key(req)?;
    let teacher_id = required_str(req, "teacherId")?;
    let draft = schedule_draft(req, &req.params)?;
    let ws = load_workspace(conn, req)?;

    let schedule = validate_schedule(&draft, &ws.config).map_err(|e| scheduling_err(&req.id, &e))?;
    let view = StoreView::with_sections(&ws.subjects, &ws.sections);
    let proposal = Proposal::from_schedule(teacher_id.as_str(), &schedule);
    let conflicts = detect_conflicts_by_day(&proposal, &key, &view, ws.config.conflict_policy)
        .map_err(|e| scheduling_err(&req.id, &e))?;

    let messages: Vec<&str> = conflicts.iter().map(|c| c.message.as_str()).collect();
    Ok(json!({
        "conflicts": messages,
        "details": conflicts,
    }))
}

fn handle_add(state: &mut AppState, req: &Request) -> Result<Value, Value> {
    let conn = db_conn(state, req)?;
    let key = section_key(req)?;
    let teacher_id = required_str(req, "teacherId")?;
    let mut ws = load_workspace(conn, req)?;
    if !ws.has_section(&key.section_id) {
        return Err(err(
            &req.id,
            "unknown_section",
            format!("unknown section: {}", key.section_id),
            None,
        ));
    }

    let outcome = add_assignment(&mut ws.subjects, &key, &teacher_id, None)
        .map_err(|e| scheduling_err(&req.id, &e))?;
    commit_if_changed(conn, &ws, &key, outcome, req)?;
    Ok(json!({ "outcome": outcome }))
}

fn handle_remove(state: &mut AppState, req: &Request) -> Result<Value, Value> {
    let conn = db_conn(state, req)?;
    let key = section_key(req)?;
    let teacher_id = required_str(req, "teacherId")?;
    let mut ws = load_workspace(conn, req)?;

    let outcome = remove_assignment(&mut ws.subjects, &key, &teacher_id)
        .map_err(|e| scheduling_err(&req.id, &e))?;
    commit_if_changed(conn, &ws, &key, outcome, req)?;
    Ok(json!({ "outcome": outcome }))
}

fn handle_update_schedule(state: &mut AppState, req: &Request) -> Result<Value, Value> {
    let conn = db_conn(state, req)?;
    let key = section_key(req)?;
    let teacher_id = required_str(req, "teacherId")?;
    let draft = schedule_draft(req, &req.params)?;
    let mut ws = load_workspace(conn, req)?;

    let schedule = validate_schedule(&draft, &ws.config).map_err(|e| scheduling_err(&req.id, &e))?;
    let outcome = update_schedule(
        &mut ws.subjects,
        Some(&ws.sections),
        &key,
        &teacher_id,
        schedule.clone(),
        &ws.config,
    )
    .map_err(|e| scheduling_err(&req.id, &e))?;
    commit_if_changed(conn, &ws, &key, outcome, req)?;
    Ok(json!({ "outcome": outcome, "schedule": schedule }))
}

fn handle_reset_schedule(state: &mut AppState, req: &Request) -> Result<Value, Value> {
    let conn = db_conn(state, req)?;
    let key = section_key(req)?;
    let teacher_id = required_str(req, "teacherId")?;
    let mut ws = load_workspace(conn, req)?;

    let outcome = reset_schedule(&mut ws.subjects, &key, &teacher_id)
        .map_err(|e| scheduling_err(&req.id, &e))?;
    commit_if_changed(conn, &ws, &key, outcome, req)?;
    Ok(json!({ "outcome": outcome }))
}

fn parse_sections_by_subject(req: &Request) -> Result<SectionsBySubject, Value> {
    let mut out = SectionsBySubject::new();
    let Some(raw) = req.params.get("sectionsBySubject").filter(|v| !v.is_null()) else {
        return Ok(out);
    };
    let Some(obj) = raw.as_object() else {
        return Err(err(&req.id, "bad_params", "sectionsBySubject must be an object", None));
    };
    for (subject_id, sections) in obj {
        let ids = string_list(req, Some(sections), "sectionsBySubject")?;
        out.insert(subject_id.clone(), ids.into_iter().collect());
    }
    Ok(out)
}

type ParsedSchedules = (HashMap<SectionKey, Schedule>, Vec<(SectionKey, SchedulingError)>);

/// Proposed schedules for additions: `[{subjectId, sectionId, ...schedule}]`.
/// Drafts that fail validation come back separately so the matching addition
/// can be reported instead of applied unscheduled.
fn parse_schedules(req: &Request, ws: &Workspace) -> Result<ParsedSchedules, Value> {
    let mut valid = HashMap::new();
    let mut rejected = Vec::new();
    let Some(raw) = req.params.get("schedules").filter(|v| !v.is_null()) else {
        return Ok((valid, rejected));
    };
    let Some(items) = raw.as_array() else {
        return Err(err(&req.id, "bad_params", "schedules must be an array", None));
    };
    for item in items {
        let subject_id = item.get("subjectId").and_then(|v| v.as_str());
        let section_id = item.get("sectionId").and_then(|v| v.as_str());
        let (Some(subject_id), Some(section_id)) = (subject_id, section_id) else {
            return Err(err(
                &req.id,
                "bad_params",
                "each schedule needs subjectId and sectionId",
                None,
            ));
        };
        let key = SectionKey::new(subject_id, section_id);
        let draft = schedule_draft(req, item)?;
        match validate_schedule(&draft, &ws.config) {
            Ok(s) => {
                valid.insert(key, s);
            }
            Err(e) => rejected.push((key, e)),
        }
    }
    Ok((valid, rejected))
}

fn handle_reconcile(state: &mut AppState, req: &Request) -> Result<Value, Value> {
    let conn = db_conn(state, req)?;
    let teacher_id = required_str(req, "teacherId")?;
    let subject_ids = string_list(req, req.params.get("subjectIds"), "subjectIds")?;
    let section_ids = string_list(req, req.params.get("sectionIds"), "sectionIds")?;
    let per_subject = parse_sections_by_subject(req)?;
    let dry_run = req
        .params
        .get("dryRun")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let desired = desired_from_selection(&subject_ids, &section_ids, &per_subject);
    let mut ws = load_workspace(conn, req)?;
    let mut plan = plan_for_teacher(&ws.subjects, &teacher_id, &desired);

    if dry_run {
        return Ok(json!({ "dryRun": true, "noop": plan.is_noop(), "plan": plan }));
    }

    let (schedules, rejected) = parse_schedules(req, &ws)?;
    let mut early_failures = Vec::new();
    for (key, e) in rejected {
        if plan.to_add.contains(&key) {
            plan.to_add.retain(|k| k != &key);
            early_failures.push(OperationFailure::rejected_add(&key, &e));
        } else {
            warn!(subject = %key.subject_id, section = %key.section_id, "ignoring schedule for a pair that is not being added");
        }
    }

    let ctx = ApplyContext {
        sections: Some(&ws.sections),
        schedules: &schedules,
        config: &ws.config,
    };
    let mut report = apply_plan(&mut ws.subjects, &plan, &ctx, |subject| {
        db::subject_save_assignments(conn, subject)
    });
    early_failures.append(&mut report.failures);
    report.failures = early_failures;

    let summary = report.summary();
    let report = report
        .into_result()
        .map_err(|e| scheduling_err(&req.id, &e))?;
    Ok(json!({
        "teacherId": report.teacher_id,
        "added": report.added,
        "removed": report.removed,
        "unchanged": report.unchanged,
        "failures": report.failures,
        "summary": summary,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "assignments.listForTeacher" => handle_list_for_teacher(state, req),
        "assignments.checkConflicts" => handle_check_conflicts(state, req),
        "assignments.add" => handle_add(state, req),
        "assignments.remove" => handle_remove(state, req),
        "assignments.updateSchedule" => handle_update_schedule(state, req),
        "assignments.resetSchedule" => handle_reset_schedule(state, req),
        "assignments.reconcile" => handle_reconcile(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e,
    })
}
