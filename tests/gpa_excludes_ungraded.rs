use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_lmsd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn lmsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

// One class per semester, each with a single weight-100 category holding a
// single 100-point assignment, so the percentage is just the score.
fn seed_semester_class(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    season: &str,
    year: i64,
) -> (String, String) {
    let tag = format!("{}{}", season, year);
    let class = request_ok(
        stdin,
        reader,
        &format!("cl-{tag}"),
        "classes.create",
        json!({
            "subject": "CS",
            "number": 5530,
            "season": season,
            "year": year,
            "location": "WEB L104",
            "start": "09:10:00",
            "end": "10:30:00",
            "professorUid": "p0000001"
        }),
    );
    let class_id = class
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();

    request_ok(
        stdin,
        reader,
        &format!("cat-{tag}"),
        "categories.create",
        json!({ "classId": class_id, "name": "Everything", "weight": 100 }),
    );
    let assignment = request_ok(
        stdin,
        reader,
        &format!("a-{tag}"),
        "assignments.create",
        json!({
            "classId": class_id,
            "categoryName": "Everything",
            "name": "Final Project",
            "maxPoints": 100,
            "due": "2025-12-01T23:59:00",
            "contents": ""
        }),
    );
    let assignment_id = assignment
        .get("assignmentId")
        .and_then(|v| v.as_str())
        .expect("assignmentId")
        .to_string();

    request_ok(
        stdin,
        reader,
        &format!("e-{tag}"),
        "enrollments.create",
        json!({ "studentUid": "u0000001", "classId": class_id }),
    );

    (class_id, assignment_id)
}

fn submit_and_grade(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    assignment_id: &str,
    score: i64,
) -> String {
    request_ok(
        stdin,
        reader,
        &format!("sub-{assignment_id}"),
        "submissions.submit",
        json!({
            "assignmentId": assignment_id,
            "studentUid": "u0000001",
            "contents": "work"
        }),
    );
    let graded = request_ok(
        stdin,
        reader,
        &format!("g-{assignment_id}"),
        "submissions.grade",
        json!({
            "assignmentId": assignment_id,
            "studentUid": "u0000001",
            "score": score
        }),
    );
    graded
        .get("grade")
        .and_then(|v| v.as_str())
        .expect("grade")
        .to_string()
}

#[test]
fn gpa_averages_only_the_assigned_letter_grades() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let workspace = temp_dir("lmsd-gpa");
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "d1",
        "departments.create",
        json!({ "subject": "CS", "name": "Computer Science" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "c1",
        "courses.create",
        json!({ "subject": "CS", "number": 5530, "name": "Database Systems" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "p1",
        "users.create",
        json!({
            "uid": "p0000001",
            "role": "professor",
            "firstName": "Daniel",
            "lastName": "Kopta",
            "department": "CS"
        }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "users.create",
        json!({
            "uid": "u0000001",
            "role": "student",
            "firstName": "Jane",
            "lastName": "Doe",
            "department": "CS"
        }),
    );

    let (_, fall24) = seed_semester_class(&mut stdin, &mut reader, "Fall", 2024);
    let (_, spring25) = seed_semester_class(&mut stdin, &mut reader, "Spring", 2025);
    let (_, summer25) = seed_semester_class(&mut stdin, &mut reader, "Summer", 2025);
    // Fall 2025 is enrolled but never graded; it must not count.
    let (fall25_class, _) = seed_semester_class(&mut stdin, &mut reader, "Fall", 2025);

    assert_eq!(submit_and_grade(&mut stdin, &mut reader, &fall24, 95), "A");
    assert_eq!(
        submit_and_grade(&mut stdin, &mut reader, &spring25, 88),
        "B+"
    );
    assert_eq!(
        submit_and_grade(&mut stdin, &mut reader, &summer25, 75),
        "C"
    );

    let enrollments = request_ok(
        &mut stdin,
        &mut reader,
        "el",
        "enrollments.list",
        json!({ "studentUid": "u0000001" }),
    );
    let ungraded = enrollments
        .get("enrollments")
        .and_then(|v| v.as_array())
        .expect("enrollments")
        .iter()
        .find(|e| e.get("classId").and_then(|v| v.as_str()) == Some(fall25_class.as_str()))
        .and_then(|e| e.get("grade"))
        .and_then(|v| v.as_str())
        .expect("grade");
    assert_eq!(ungraded, "--");

    // (4.0 + 3.3 + 2.0) / 3, the "--" enrollment excluded from both sides.
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "gpa",
        "gpa.get",
        json!({ "studentUid": "u0000001" }),
    );
    let gpa = result.get("gpa").and_then(|v| v.as_f64()).expect("gpa");
    assert!((gpa - 3.1).abs() < 1e-9, "gpa was {}", gpa);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn gpa_with_no_enrollments_is_zero() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let workspace = temp_dir("lmsd-gpa-empty");
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "d1",
        "departments.create",
        json!({ "subject": "CS", "name": "Computer Science" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "users.create",
        json!({
            "uid": "u0000002",
            "role": "student",
            "firstName": "No",
            "lastName": "Classes",
            "department": "CS"
        }),
    );

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "gpa",
        "gpa.get",
        json!({ "studentUid": "u0000002" }),
    );
    assert_eq!(result.get("gpa").and_then(|v| v.as_f64()), Some(0.0));

    drop(stdin);
    let _ = child.wait();
}
