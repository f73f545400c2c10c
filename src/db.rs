use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::schedule::config::{SchedulingConfig, SETTINGS_KEY};
use crate::schedule::model::{AssignmentRecord, Section, Subject, UnreadableRecord};
use crate::schedule::time::parse_clock;

pub const DB_FILE: &str = "facultyd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            teacher_assignments TEXT NOT NULL DEFAULT '{}'
        )",
        [],
    )?;
    // Older workspaces predate subject codes and write stamps.
    ensure_subjects_code(&conn)?;
    ensure_subjects_updated_at(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            grade_level TEXT,
            department TEXT,
            rank INTEGER
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sections_rank ON sections(rank, name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    debug!(path = %db_path.display(), "workspace database ready");
    Ok(conn)
}

fn ensure_subjects_code(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "subjects", "code")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE subjects ADD COLUMN code TEXT", [])?;
    Ok(())
}

fn ensure_subjects_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "subjects", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE subjects ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<JsonValue>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            warn!(key, error = %e, "ignoring unreadable setting");
            Ok(None)
        }
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &JsonValue) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        params![key, serde_json::to_string(value)?],
    )?;
    Ok(())
}

pub fn load_scheduling_config(conn: &Connection) -> anyhow::Result<SchedulingConfig> {
    Ok(match settings_get_json(conn, SETTINGS_KEY)? {
        Some(JsonValue::Object(obj)) => SchedulingConfig::from_settings(&obj),
        _ => SchedulingConfig::default(),
    })
}

/// First stored clock string in a record's schedule that does not parse.
fn bad_stored_time(record: &JsonValue) -> Option<String> {
    let schedule = record.get("schedule").filter(|s| !s.is_null())?;
    ["startTime", "endTime"]
        .iter()
        .filter_map(|field| schedule.get(*field).and_then(|v| v.as_str()))
        .find(|s| parse_clock(s).is_err())
        .map(str::to_string)
}

/// Decodes one record. Records that do not decode are quarantined rather
/// than failing the whole subject.
fn decode_record(subject_id: &str, section_id: &str, raw: JsonValue) -> AssignmentRecord {
    if let Some(input) = bad_stored_time(&raw) {
        warn!(subject = subject_id, section = section_id, input = %input, "stored schedule has an unreadable time");
        let reason = format!("invalid time {:?}", input);
        return AssignmentRecord::Unreadable(UnreadableRecord::quarantine(&raw, Some(input), reason));
    }
    match serde_json::from_value::<AssignmentRecord>(raw.clone()) {
        Ok(record) => record,
        Err(e) => {
            warn!(subject = subject_id, section = section_id, error = %e, "stored assignment is unreadable");
            AssignmentRecord::Unreadable(UnreadableRecord::quarantine(&raw, None, e.to_string()))
        }
    }
}

fn decode_assignments(
    subject_id: &str,
    raw: &str,
) -> anyhow::Result<BTreeMap<String, AssignmentRecord>> {
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let value: JsonValue = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("subject {}: teacher_assignments is not JSON: {}", subject_id, e))?;
    let JsonValue::Object(map) = value else {
        anyhow::bail!("subject {}: teacher_assignments is not an object", subject_id);
    };
    Ok(map
        .into_iter()
        .map(|(section_id, record)| {
            let decoded = decode_record(subject_id, &section_id, record);
            (section_id, decoded)
        })
        .collect())
}

pub fn subjects_load(conn: &Connection) -> anyhow::Result<Vec<Subject>> {
    let mut stmt = conn.prepare(
        "SELECT id, code, name, teacher_assignments FROM subjects ORDER BY name, id",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, Option<String>>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, code, name, raw) = row?;
        let teacher_assignments = decode_assignments(&id, raw.as_deref().unwrap_or(""))?;
        out.push(Subject {
            id,
            code,
            name,
            teacher_assignments,
        });
    }
    Ok(out)
}

pub fn subject_insert(conn: &Connection, subject: &Subject) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO subjects(id, code, name, teacher_assignments, updated_at)
         VALUES(?, ?, ?, ?, ?)",
        params![
            subject.id,
            subject.code,
            subject.name,
            serde_json::to_string(&subject.teacher_assignments)?,
            now_ts()
        ],
    )?;
    Ok(())
}

/// Writes back one subject's assignment map. This is the commit point for a
/// single mutation.
pub fn subject_save_assignments(conn: &Connection, subject: &Subject) -> anyhow::Result<()> {
    let changed = conn.execute(
        "UPDATE subjects SET teacher_assignments = ?, updated_at = ? WHERE id = ?",
        params![
            serde_json::to_string(&subject.teacher_assignments)?,
            now_ts(),
            subject.id
        ],
    )?;
    if changed == 0 {
        anyhow::bail!("subject {} no longer exists", subject.id);
    }
    Ok(())
}

pub fn sections_load(conn: &Connection) -> anyhow::Result<Vec<Section>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, grade_level, department, rank FROM sections
         ORDER BY rank IS NULL, rank, name, id",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok(Section {
            id: r.get(0)?,
            name: r.get(1)?,
            grade_level: r.get(2)?,
            department: r.get(3)?,
            rank: r.get(4)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn section_insert(conn: &Connection, section: &Section) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO sections(id, name, grade_level, department, rank) VALUES(?, ?, ?, ?, ?)",
        params![
            section.id,
            section.name,
            section.grade_level,
            section.department,
            section.rank
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::error::SchedulingError;
    use serde_json::json;

    fn temp_workspace(prefix: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn subjects_round_trip_both_record_shapes() {
        let ws = temp_workspace("facultyd-db");
        let conn = open_db(&ws).unwrap();
        conn.execute(
            "INSERT INTO subjects(id, name, teacher_assignments) VALUES(?, ?, ?)",
            params![
                "sub1",
                "Math",
                json!({
                    "s1": ["t1"],
                    "s2": {"teacherId": "t2", "schedule": {
                        "dayOfWeek": "Monday",
                        "startTime": "8:00 AM",
                        "endTime": "9:00 AM",
                        "room": "101"
                    }}
                })
                .to_string()
            ],
        )
        .unwrap();

        let mut subjects = subjects_load(&conn).unwrap();
        assert_eq!(subjects.len(), 1);
        assert!(subjects[0].teacher_assignments["s1"].is_legacy());
        assert!(subjects[0].teacher_assignments["s2"].schedule().is_some());

        subjects[0]
            .teacher_assignments
            .insert("s3".into(), AssignmentRecord::new("t3"));
        subject_save_assignments(&conn, &subjects[0]).unwrap();
        let reloaded = subjects_load(&conn).unwrap();
        assert_eq!(reloaded[0].teacher_assignments.len(), 3);
        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn malformed_stored_time_is_quarantined_per_record() {
        let ws = temp_workspace("facultyd-db-bad");
        let conn = open_db(&ws).unwrap();
        let stored = json!({
            "s1": {"teacherId": "t1", "schedule": {
                "dayOfWeek": ["Monday"], "startTime": "0800", "endTime": "9:00 AM", "room": "1"
            }},
            "s2": {"teacherId": "t2"},
            "s3": 7
        });
        conn.execute(
            "INSERT INTO subjects(id, name, teacher_assignments) VALUES('x', 'X', ?)",
            [stored.to_string()],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO subjects(id, name, teacher_assignments) VALUES('y', 'Y', ?)",
            [json!({"s1": {"teacherId": "t3"}}).to_string()],
        )
        .unwrap();

        let mut subjects = subjects_load(&conn).unwrap();
        assert_eq!(subjects.len(), 2);
        let x = &subjects[0].teacher_assignments;
        let bad = x["s1"].unreadable().expect("quarantined");
        assert_eq!(x["s1"].teacher_id(), Some("t1"));
        let key = crate::schedule::SectionKey::new("x", "s1");
        match bad.error(&key) {
            SchedulingError::InvalidTimeFormat { input } => assert_eq!(input, "0800"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(x["s2"], AssignmentRecord::new("t2"));
        assert_eq!(x["s3"].unreadable().map(|u| u.error(&key).code()), Some("unreadable_record"));
        assert_eq!(subjects[1].teacher_assignments["s1"], AssignmentRecord::new("t3"));

        // Writing the subject back keeps the quarantined JSON as it was.
        subjects[0].teacher_assignments.remove("s2");
        subject_save_assignments(&conn, &subjects[0]).unwrap();
        let raw: String = conn
            .query_row("SELECT teacher_assignments FROM subjects WHERE id = 'x'", [], |r| r.get(0))
            .unwrap();
        let back: JsonValue = serde_json::from_str(&raw).unwrap();
        assert_eq!(back["s1"], stored["s1"]);
        assert_eq!(back["s3"], json!(7));
        assert!(back.get("s2").is_none());
        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn scheduling_config_reads_saved_section() {
        let ws = temp_workspace("facultyd-db-cfg");
        let conn = open_db(&ws).unwrap();
        assert_eq!(load_scheduling_config(&conn).unwrap(), SchedulingConfig::default());
        settings_set_json(&conn, SETTINGS_KEY, &json!({"slotMinutes": 30})).unwrap();
        assert_eq!(load_scheduling_config(&conn).unwrap().slot_minutes, 30);
        // Reopening runs the migrations again without complaint.
        drop(conn);
        assert!(open_db(&ws).is_ok());
        let _ = std::fs::remove_dir_all(ws);
    }
}
