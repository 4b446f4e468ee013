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

struct Seeded {
    class_id: String,
    hw1_id: String,
    midterm_id: String,
}

fn seed_class(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Seeded {
    let workspace = temp_dir("lmsd-grade-flow");
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        stdin,
        reader,
        "d1",
        "departments.create",
        json!({ "subject": "CS", "name": "Computer Science" }),
    );
    request_ok(
        stdin,
        reader,
        "c1",
        "courses.create",
        json!({ "subject": "CS", "number": 5530, "name": "Database Systems" }),
    );
    request_ok(
        stdin,
        reader,
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
        stdin,
        reader,
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
    let class = request_ok(
        stdin,
        reader,
        "cl1",
        "classes.create",
        json!({
            "subject": "CS",
            "number": 5530,
            "season": "Fall",
            "year": 2025,
            "location": "WEB L104",
            "start": "10:45:00",
            "end": "12:05:00",
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
        "cat1",
        "categories.create",
        json!({ "classId": class_id, "name": "Homework", "weight": 30 }),
    );
    request_ok(
        stdin,
        reader,
        "cat2",
        "categories.create",
        json!({ "classId": class_id, "name": "Exams", "weight": 70 }),
    );

    let hw1 = request_ok(
        stdin,
        reader,
        "a1",
        "assignments.create",
        json!({
            "classId": class_id,
            "categoryName": "Homework",
            "name": "HW1",
            "maxPoints": 100,
            "due": "2025-09-10T23:59:00",
            "contents": "Write a schema."
        }),
    );
    let hw1_id = hw1
        .get("assignmentId")
        .and_then(|v| v.as_str())
        .expect("assignmentId")
        .to_string();

    let midterm = request_ok(
        stdin,
        reader,
        "a2",
        "assignments.create",
        json!({
            "classId": class_id,
            "categoryName": "Exams",
            "name": "Midterm",
            "maxPoints": 50,
            "due": "2025-10-15T10:45:00",
            "contents": ""
        }),
    );
    let midterm_id = midterm
        .get("assignmentId")
        .and_then(|v| v.as_str())
        .expect("assignmentId")
        .to_string();

    request_ok(
        stdin,
        reader,
        "e1",
        "enrollments.create",
        json!({ "studentUid": "u0000001", "classId": class_id }),
    );

    Seeded {
        class_id,
        hw1_id,
        midterm_id,
    }
}

fn roster_grade(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    class_id: &str,
    uid: &str,
) -> String {
    let roster = request_ok(
        stdin,
        reader,
        id,
        "roster.get",
        json!({ "classId": class_id }),
    );
    roster
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students array")
        .iter()
        .find(|s| s.get("uid").and_then(|v| v.as_str()) == Some(uid))
        .and_then(|s| s.get("grade"))
        .and_then(|v| v.as_str())
        .expect("grade field")
        .to_string()
}

#[test]
fn grading_a_submission_recomputes_the_enrollment_grade() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let seeded = seed_class(&mut stdin, &mut reader);

    // Nothing graded yet.
    assert_eq!(
        roster_grade(&mut stdin, &mut reader, "r0", &seeded.class_id, "u0000001"),
        "--"
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "sub1",
        "submissions.submit",
        json!({
            "assignmentId": seeded.hw1_id,
            "studentUid": "u0000001",
            "contents": "CREATE TABLE ..."
        }),
    );

    // Only Homework qualifies, so 90/100 renormalizes to 90% -> A-.
    let graded = request_ok(
        &mut stdin,
        &mut reader,
        "g1",
        "submissions.grade",
        json!({
            "assignmentId": seeded.hw1_id,
            "studentUid": "u0000001",
            "score": 90
        }),
    );
    assert_eq!(graded.get("grade").and_then(|v| v.as_str()), Some("A-"));
    assert_eq!(
        roster_grade(&mut stdin, &mut reader, "r1", &seeded.class_id, "u0000001"),
        "A-"
    );

    // A midterm submission pulls the weight-70 category in:
    // (0.9 * 30 + 0.7 * 70) / 100 * 100 = 76 -> C.
    request_ok(
        &mut stdin,
        &mut reader,
        "sub2",
        "submissions.submit",
        json!({
            "assignmentId": seeded.midterm_id,
            "studentUid": "u0000001",
            "contents": "answers"
        }),
    );
    let graded = request_ok(
        &mut stdin,
        &mut reader,
        "g2",
        "submissions.grade",
        json!({
            "assignmentId": seeded.midterm_id,
            "studentUid": "u0000001",
            "score": 35
        }),
    );
    assert_eq!(graded.get("grade").and_then(|v| v.as_str()), Some("C"));
    assert_eq!(
        roster_grade(&mut stdin, &mut reader, "r2", &seeded.class_id, "u0000001"),
        "C"
    );

    // Regrading upward moves the letter up: (27 + 0.98 * 70) = 95.6 -> A.
    let graded = request_ok(
        &mut stdin,
        &mut reader,
        "g3",
        "submissions.grade",
        json!({
            "assignmentId": seeded.midterm_id,
            "studentUid": "u0000001",
            "score": 49
        }),
    );
    assert_eq!(graded.get("grade").and_then(|v| v.as_str()), Some("A"));
    assert_eq!(
        roster_grade(&mut stdin, &mut reader, "r3", &seeded.class_id, "u0000001"),
        "A"
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn an_ungraded_submission_qualifies_its_category_at_zero() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let seeded = seed_class(&mut stdin, &mut reader);

    // HW1 is graded to full marks; the midterm is submitted but never
    // scored. Exams still joins the denominator, dragging the total to
    // (1.0 * 30 + 0.0 * 70) / 100 * 100 = 30 -> E.
    request_ok(
        &mut stdin,
        &mut reader,
        "sub1",
        "submissions.submit",
        json!({
            "assignmentId": seeded.hw1_id,
            "studentUid": "u0000001",
            "contents": "done"
        }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "sub2",
        "submissions.submit",
        json!({
            "assignmentId": seeded.midterm_id,
            "studentUid": "u0000001",
            "contents": "half done"
        }),
    );
    let graded = request_ok(
        &mut stdin,
        &mut reader,
        "g1",
        "submissions.grade",
        json!({
            "assignmentId": seeded.hw1_id,
            "studentUid": "u0000001",
            "score": 100
        }),
    );
    assert_eq!(graded.get("grade").and_then(|v| v.as_str()), Some("E"));

    drop(stdin);
    let _ = child.wait();
}
