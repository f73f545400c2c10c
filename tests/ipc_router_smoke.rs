mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{request, request_err, request_ok, spawn_sidecar, temp_dir, Sidecar};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let mut sc = Sidecar::start("facultyd-router-smoke");

    let health = sc.ok("health", json!({}));
    assert!(health["version"].as_str().is_some());
    assert!(health["workspacePath"].as_str().is_some());

    sc.subject("math", "Math");
    sc.section("s1", "Grade 7 - Rizal");
    let methods = [
        ("setup.get", json!({})),
        ("setup.update", json!({ "scheduling": {} })),
        ("schedule.timeOptions", json!({})),
        ("subjects.list", json!({})),
        ("sections.list", json!({})),
        ("assignments.listForTeacher", json!({ "teacherId": "t1" })),
        (
            "assignments.add",
            json!({ "subjectId": "math", "sectionId": "s1", "teacherId": "t1" }),
        ),
        (
            "assignments.checkConflicts",
            json!({
                "subjectId": "math", "sectionId": "s1", "teacherId": "t1",
                "dayOfWeek": ["Monday"], "startTime": "8:00 AM", "endTime": "9:00 AM",
                "room": "101", "deliveryMode": "faceToFace"
            }),
        ),
        (
            "assignments.updateSchedule",
            json!({
                "subjectId": "math", "sectionId": "s1", "teacherId": "t1",
                "dayOfWeek": ["Monday"], "startTime": "8:00 AM", "endTime": "9:00 AM",
                "room": "101"
            }),
        ),
        (
            "assignments.resetSchedule",
            json!({ "subjectId": "math", "sectionId": "s1", "teacherId": "t1" }),
        ),
        (
            "assignments.reconcile",
            json!({ "teacherId": "t1", "subjectIds": ["math"], "sectionIds": ["s1"], "dryRun": true }),
        ),
        (
            "assignments.remove",
            json!({ "subjectId": "math", "sectionId": "s1", "teacherId": "t1" }),
        ),
    ];
    for (method, params) in methods {
        let resp = sc.call(method, params);
        assert_eq!(resp["ok"], json!(true), "{} failed: {}", method, resp);
    }

    let unknown = sc.err("classes.create", json!({ "name": "nope" }));
    assert_eq!(unknown["code"], "not_implemented");
}

#[test]
fn scheduling_methods_require_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["workspacePath"].is_null());

    let e = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "assignments.listForTeacher",
        json!({ "teacherId": "t1" }),
    );
    assert_eq!(e["code"], "no_workspace");

    let e = request_err(&mut stdin, &mut reader, "3", "workspace.select", json!({}));
    assert_eq!(e["code"], "bad_params");

    let workspace = temp_dir("facultyd-router-missing");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(workspace.join("facultyd.sqlite3").is_file());

    let e = request_err(&mut stdin, &mut reader, "5", "assignments.add", json!({ "subjectId": "x" }));
    assert_eq!(e["code"], "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_lines_get_bad_json_and_the_loop_continues() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("response json");
    assert_eq!(value["ok"], json!(false));
    assert_eq!(value["error"]["code"], "bad_json");

    writeln!(stdin).expect("blank line");
    let resp = request(&mut stdin, &mut reader, "after", "health", json!({}));
    assert_eq!(resp["ok"], json!(true));

    drop(stdin);
    let _ = child.wait();
}
