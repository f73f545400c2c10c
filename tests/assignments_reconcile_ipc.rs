mod test_support;

use serde_json::json;
use test_support::Sidecar;

fn seeded(prefix: &str) -> Sidecar {
    let mut sc = Sidecar::start(prefix);
    sc.subject("A", "Algebra");
    sc.subject("B", "Biology");
    for (id, name) in [("s1", "10-A"), ("s2", "10-B"), ("s3", "10-C")] {
        sc.section(id, name);
    }
    sc
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn selection_diff_adds_and_removes_per_subject() {
    let mut sc = seeded("facultyd-reconcile-diff");
    sc.add("A", "s2", "t1");
    sc.add("A", "s3", "t1");

    let res = sc.ok(
        "assignments.reconcile",
        json!({ "teacherId": "t1", "subjectIds": ["A"], "sectionIds": ["s1", "s2"] }),
    );
    assert_eq!(res["added"], 1);
    assert_eq!(res["removed"], 1);
    assert_eq!(res["unchanged"], 1);
    assert_eq!(res["summary"], "1 assignments saved, 1 removed");
    assert_eq!(sc.held("t1", "A"), ids(&["s1", "s2"]));

    // Running the same selection again changes nothing.
    let res = sc.ok(
        "assignments.reconcile",
        json!({ "teacherId": "t1", "subjectIds": ["A"], "sectionIds": ["s1", "s2"] }),
    );
    assert_eq!(res["summary"], "no changes");
    assert_eq!(res["unchanged"], 2);
}

#[test]
fn dry_run_reports_the_plan_without_writing() {
    let mut sc = seeded("facultyd-reconcile-dry");
    sc.add("A", "s3", "t1");

    let res = sc.ok(
        "assignments.reconcile",
        json!({ "teacherId": "t1", "subjectIds": ["A"], "sectionIds": ["s1"], "dryRun": true }),
    );
    assert_eq!(res["dryRun"], true);
    assert_eq!(res["noop"], false);
    assert_eq!(res["plan"]["toAdd"], json!([{ "subjectId": "A", "sectionId": "s1" }]));
    assert_eq!(res["plan"]["toRemove"], json!([{ "subjectId": "A", "sectionId": "s3" }]));
    assert_eq!(sc.held("t1", "A"), ids(&["s3"]));
}

#[test]
fn per_subject_sections_override_the_shared_list() {
    let mut sc = seeded("facultyd-reconcile-per-subject");
    let res = sc.ok(
        "assignments.reconcile",
        json!({
            "teacherId": "t1",
            "subjectIds": ["A", "B"],
            "sectionIds": ["s1"],
            "sectionsBySubject": { "B": ["s2", "s3"] }
        }),
    );
    assert_eq!(res["added"], 3);
    assert_eq!(sc.held("t1", "A"), ids(&["s1"]));
    assert_eq!(sc.held("t1", "B"), ids(&["s2", "s3"]));

    // Dropping a subject from the selection removes all of its sections.
    let res = sc.ok(
        "assignments.reconcile",
        json!({ "teacherId": "t1", "subjectIds": ["A"], "sectionIds": ["s1"] }),
    );
    assert_eq!(res["removed"], 2);
    assert!(sc.held("t1", "B").is_empty());
}

#[test]
fn removals_run_before_scheduled_additions() {
    let mut sc = seeded("facultyd-reconcile-move");
    sc.add("A", "s1", "t1");
    let monday = json!({
        "dayOfWeek": ["Monday"],
        "startTime": "8:00 AM",
        "endTime": "9:00 AM",
        "room": "101",
        "deliveryMode": "faceToFace"
    });
    let mut first = monday.clone();
    first["subjectId"] = json!("A");
    first["sectionId"] = json!("s1");
    first["teacherId"] = json!("t1");
    sc.ok("assignments.updateSchedule", first);

    // Same teacher, same slot, different class: fine once A/s1 is released.
    let mut moved = monday.clone();
    moved["subjectId"] = json!("B");
    moved["sectionId"] = json!("s2");
    let res = sc.ok(
        "assignments.reconcile",
        json!({
            "teacherId": "t1",
            "subjectIds": ["B"],
            "sectionIds": ["s2"],
            "schedules": [moved]
        }),
    );
    assert_eq!(res["added"], 1);
    assert_eq!(res["removed"], 1);

    let listed = sc.ok("assignments.listForTeacher", json!({ "teacherId": "t1" }));
    assert_eq!(listed["subjects"][0]["subjectId"], "B");
    assert_eq!(listed["subjects"][0]["sections"][0]["schedule"]["room"], "101");
}

#[test]
fn failures_are_reported_and_the_rest_still_applies() {
    let mut sc = seeded("facultyd-reconcile-partial");
    sc.add("A", "s1", "t2");

    let bad_schedule = json!({
        "subjectId": "B",
        "sectionId": "s3",
        "dayOfWeek": ["Friday"],
        "startTime": "1:00 PM",
        "endTime": "2:00 PM",
        "room": "Gym",
        "deliveryMode": "online"
    });
    let e = sc.err(
        "assignments.reconcile",
        json!({
            "teacherId": "t1",
            "subjectIds": ["A", "B"],
            "sectionsBySubject": { "A": ["s1", "s2"], "B": ["s3"] },
            "schedules": [bad_schedule]
        }),
    );
    assert_eq!(e["code"], "partial_failure");
    let message = e["message"].as_str().expect("message");
    assert!(
        message.starts_with("1 assignments saved, 0 removed, 2 failed: "),
        "{message}"
    );
    assert_eq!(e["details"]["added"], 1);
    assert_eq!(e["details"]["unchanged"], 0);
    assert_eq!(e["details"]["summary"], message);

    let codes: Vec<&str> = e["details"]["failures"]
        .as_array()
        .expect("failures")
        .iter()
        .filter_map(|f| f["code"].as_str())
        .collect();
    assert_eq!(codes, vec!["validation_failed", "section_taken"]);

    // No compensation: the successful addition stays.
    assert_eq!(sc.held("t1", "A"), ids(&["s2"]));
    assert!(sc.held("t1", "B").is_empty());
    assert_eq!(sc.held("t2", "A"), ids(&["s1"]));
}

#[test]
fn scheduled_additions_are_checked_against_each_other() {
    let mut sc = seeded("facultyd-reconcile-clash");
    let at = |subject: &str, section: &str, room: &str| {
        json!({
            "subjectId": subject,
            "sectionId": section,
            "dayOfWeek": ["Tuesday"],
            "startTime": "10:00 AM",
            "endTime": "11:00 AM",
            "room": room
        })
    };
    let e = sc.err(
        "assignments.reconcile",
        json!({
            "teacherId": "t1",
            "subjectIds": ["A", "B"],
            "sectionIds": ["s1"],
            "schedules": [at("A", "s1", "201"), at("B", "s1", "202")]
        }),
    );
    assert_eq!(e["code"], "partial_failure");
    assert_eq!(e["details"]["failures"][0]["code"], "conflict");
    assert_eq!(e["details"]["failures"][0]["subjectId"], "B");
    assert_eq!(sc.held("t1", "A"), ids(&["s1"]));
}
