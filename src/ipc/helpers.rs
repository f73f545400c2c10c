use rusqlite::Connection;
use serde_json::Value;

use crate::db;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::schedule::{SchedulingConfig, Section, SectionKey, Subject};

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// A list of ids. Missing or null reads as empty.
pub fn string_list(req: &Request, value: Option<&Value>, key: &str) -> Result<Vec<String>, Value> {
    let Some(v) = value.filter(|v| !v.is_null()) else {
        return Ok(Vec::new());
    };
    let Some(items) = v.as_array() else {
        return Err(err(&req.id, "bad_params", format!("{} must be an array", key), None));
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    err(
                        &req.id,
                        "bad_params",
                        format!("{} must contain non-empty strings", key),
                        None,
                    )
                })
        })
        .collect()
}

pub fn section_key(req: &Request) -> Result<SectionKey, Value> {
    Ok(SectionKey::new(
        required_str(req, "subjectId")?,
        required_str(req, "sectionId")?,
    ))
}

/// Everything a scheduling request reads, loaded fresh per request.
pub struct Workspace {
    pub subjects: Vec<Subject>,
    pub sections: Vec<Section>,
    pub config: SchedulingConfig,
}

impl Workspace {
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        Ok(Self {
            subjects: db::subjects_load(conn)?,
            sections: db::sections_load(conn)?,
            config: db::load_scheduling_config(conn)?,
        })
    }

    pub fn has_section(&self, section_id: &str) -> bool {
        self.sections.iter().any(|s| s.id == section_id)
    }
}
