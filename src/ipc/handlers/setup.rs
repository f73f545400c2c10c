use crate::db;
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use crate::schedule::config::{SchedulingConfig, SETTINGS_KEY};
use crate::schedule::{ClockTime, ConflictPolicy};
use serde_json::{json, Map, Value};
use tracing::info;

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_clock_value(v: &Value, key: &str) -> Result<ClockTime, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    s.parse::<ClockTime>().map_err(|e| format!("{}: {}", key, e))
}

fn parse_slot_minutes(v: &Value, key: &str) -> Result<u16, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(5..=240).contains(&n) || 1440 % n != 0 {
        return Err(format!(
            "{} must be in 5..=240 and divide a day evenly",
            key
        ));
    }
    Ok(n as u16)
}

/// Applies a strict patch on top of `current`. Unknown keys and bad values are
/// rejected, unlike stored settings which fall back per key.
fn merge_scheduling_patch(
    current: &SchedulingConfig,
    patch: &Map<String, Value>,
) -> Result<SchedulingConfig, String> {
    let mut next = current.clone();
    for (k, v) in patch {
        match k.as_str() {
            "dayStart" => next.day_start = parse_clock_value(v, k)?,
            "dayEnd" => next.day_end = parse_clock_value(v, k)?,
            "slotMinutes" => next.slot_minutes = parse_slot_minutes(v, k)?,
            "enforceGrid" => next.enforce_grid = parse_bool(v, k)?,
            "conflictPolicy" => {
                let s = v
                    .as_str()
                    .ok_or_else(|| format!("{} must be string", k))?;
                next.conflict_policy = s.parse::<ConflictPolicy>().map_err(|_| {
                    "conflictPolicy must be one of: firstPerKind, exhaustive".to_string()
                })?;
            }
            _ => return Err(format!("unknown scheduling field: {}", k)),
        }
    }
    if next.day_end <= next.day_start {
        return Err("dayEnd must be after dayStart".into());
    }
    if (next.day_end.minutes() - next.day_start.minutes()) % next.slot_minutes != 0 {
        return Err("dayStart to dayEnd must be a whole number of slots".into());
    }
    Ok(next)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match db::load_scheduling_config(conn) {
        Ok(cfg) => ok(&req.id, json!({ "scheduling": cfg.to_json() })),
        Err(e) => store_err(&req.id, "db_query_failed", e),
    }
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(patch_obj) = req.params.get("scheduling").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "scheduling must be an object", None);
    };

    let current = match db::load_scheduling_config(conn) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, "db_query_failed", e),
    };
    let next = match merge_scheduling_patch(&current, patch_obj) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    if let Err(e) = db::settings_set_json(conn, SETTINGS_KEY, &next.to_json()) {
        return store_err(&req.id, "db_update_failed", e);
    }
    info!(?next, "scheduling settings updated");
    ok(&req.id, json!({ "scheduling": next.to_json() }))
}

fn handle_time_options(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match db::load_scheduling_config(conn) {
        Ok(cfg) => ok(
            &req.id,
            json!({
                "options": cfg.time_options(),
                "slotMinutes": cfg.slot_minutes,
            }),
        ),
        Err(e) => store_err(&req.id, "db_query_failed", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        "schedule.timeOptions" => Some(handle_time_options(state, req)),
        _ => None,
    }
}
