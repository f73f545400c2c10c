use crate::db;
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{AssignmentRecord, Section, Subject};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

fn handle_subjects_create(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    // Imports may carry an existing map in either record shape.
    let teacher_assignments: BTreeMap<String, AssignmentRecord> =
        match req.params.get("teacherAssignments").filter(|v| !v.is_null()) {
            None => BTreeMap::new(),
            Some(v) => match serde_json::from_value(v.clone()) {
                Ok(m) => m,
                Err(e) => {
                    return err(
                        &req.id,
                        "bad_params",
                        format!("teacherAssignments: {}", e),
                        None,
                    )
                }
            },
        };

    let subject = Subject {
        id: optional_str(req, "id").unwrap_or_else(|| Uuid::new_v4().to_string()),
        code: optional_str(req, "code"),
        name,
        teacher_assignments,
    };
    if let Err(e) = db::subject_insert(conn, &subject) {
        return store_err(&req.id, "db_insert_failed", e);
    }
    info!(subject = %subject.id, name = %subject.name, "subject created");
    ok(&req.id, json!({ "subjectId": subject.id }))
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match db::subjects_load(conn) {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => store_err(&req.id, "db_query_failed", e),
    }
}

fn handle_sections_create(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rank = match req.params.get("rank") {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_i64() {
            Some(n) => Some(n),
            None => return err(&req.id, "bad_params", "rank must be integer", None),
        },
    };
    let section = Section {
        id: optional_str(req, "id").unwrap_or_else(|| Uuid::new_v4().to_string()),
        name,
        grade_level: optional_str(req, "gradeLevel"),
        department: optional_str(req, "department"),
        rank,
    };
    if let Err(e) = db::section_insert(conn, &section) {
        return store_err(&req.id, "db_insert_failed", e);
    }
    info!(section = %section.id, name = %section.name, "section created");
    ok(&req.id, json!({ "sectionId": section.id }))
}

fn handle_sections_list(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match db::sections_load(conn) {
        Ok(sections) => ok(&req.id, json!({ "sections": sections })),
        Err(e) => store_err(&req.id, "db_query_failed", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "sections.create" => Some(handle_sections_create(state, req)),
        "sections.list" => Some(handle_sections_list(state, req)),
        _ => None,
    }
}
