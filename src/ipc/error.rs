use serde_json::json;

use crate::schedule::SchedulingError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Engine errors keep their own code; validation messages and conflicts ride
/// along in `details`.
pub fn scheduling_err(id: &str, e: &SchedulingError) -> serde_json::Value {
    err(id, e.code(), e.to_string(), e.details())
}

/// Plumbing failures. A `SchedulingError` surfacing from storage (a stored
/// clock string that no longer parses) still reports its engine code.
pub fn store_err(id: &str, code: &str, e: anyhow::Error) -> serde_json::Value {
    match e.downcast_ref::<SchedulingError>() {
        Some(se) => scheduling_err(id, se),
        None => err(id, code, format!("{e:#}"), None),
    }
}
