use crate::grade;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_enrollments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_uid = match req.params.get("studentUid").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentUid", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT co.department, co.number, co.name, cl.season, cl.year, cl.id, e.grade
         FROM enrollments e
         JOIN classes cl ON cl.id = e.class_id
         JOIN courses co ON co.id = cl.course_id
         WHERE e.student_uid = ?
         ORDER BY cl.year, cl.season, co.department, co.number",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&student_uid], |row| {
            let subject: String = row.get(0)?;
            let number: i64 = row.get(1)?;
            let name: String = row.get(2)?;
            let season: String = row.get(3)?;
            let year: i64 = row.get(4)?;
            let class_id: String = row.get(5)?;
            let grade: String = row.get(6)?;
            Ok(json!({
                "subject": subject,
                "number": number,
                "name": name,
                "season": season,
                "year": year,
                "classId": class_id,
                "grade": grade
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(enrollments) => ok(&req.id, json!({ "enrollments": enrollments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classwork_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };
    let student_uid = match req.params.get("studentUid").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentUid", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "class not found", None);
    }

    // Left join keeps assignments the student never submitted to; their score
    // reads as null, same as a submission that is still ungraded.
    let mut stmt = match conn.prepare(
        "SELECT a.id, a.name, c.name, a.due, a.max_points, s.score
         FROM assignments a
         JOIN categories c ON c.id = a.category_id
         LEFT JOIN submissions s
           ON s.assignment_id = a.id AND s.student_uid = ?2
         WHERE c.class_id = ?1
         ORDER BY c.name, a.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map((&class_id, &student_uid), |row| {
            let id: String = row.get(0)?;
            let aname: String = row.get(1)?;
            let cname: String = row.get(2)?;
            let due: String = row.get(3)?;
            let max_points: i64 = row.get(4)?;
            let score: Option<i64> = row.get(5)?;
            Ok(json!({
                "id": id,
                "aname": aname,
                "cname": cname,
                "due": due,
                "maxPoints": max_points,
                "score": score
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(assignments) => ok(&req.id, json!({ "assignments": assignments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

// Resubmitting replaces the work and the timestamp but never touches a score
// a professor has already assigned. A first submission starts ungraded.
fn handle_submissions_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let assignment_id = match req.params.get("assignmentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing assignmentId", None),
    };
    let student_uid = match req.params.get("studentUid").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentUid", None),
    };
    let contents = match req.params.get("contents").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing contents", None),
    };

    let assignment_exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM assignments WHERE id = ?",
            [&assignment_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if assignment_exists.is_none() {
        return err(&req.id, "not_found", "assignment not found", None);
    }

    let student_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE uid = ?", [&student_uid], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if student_exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let submitted_at = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();

    let existing: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM submissions WHERE assignment_id = ? AND student_uid = ?",
            (&assignment_id, &student_uid),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if existing.is_some() {
        if let Err(e) = conn.execute(
            "UPDATE submissions SET solution = ?, submitted_at = ?
             WHERE assignment_id = ? AND student_uid = ?",
            (&contents, &submitted_at, &assignment_id, &student_uid),
        ) {
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "submissions" })),
            );
        }
    } else if let Err(e) = conn.execute(
        "INSERT INTO submissions(assignment_id, student_uid, score, solution, submitted_at)
         VALUES(?, ?, NULL, ?, ?)",
        (&assignment_id, &student_uid, &contents, &submitted_at),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "submissions" })),
        );
    }

    ok(&req.id, json!({ "submittedAt": submitted_at }))
}

fn handle_enrollments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_uid = match req.params.get("studentUid").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentUid", None),
    };
    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };

    let student_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE uid = ?", [&student_uid], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if student_exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let class_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if class_exists.is_none() {
        return err(&req.id, "not_found", "class not found", None);
    }

    let already: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM enrollments WHERE student_uid = ? AND class_id = ?",
            (&student_uid, &class_id),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if already.is_some() {
        return err(&req.id, "conflict", "student already enrolled", None);
    }

    if let Err(e) = conn.execute(
        "INSERT INTO enrollments(student_uid, class_id, grade) VALUES(?, ?, ?)",
        (&student_uid, &class_id, grade::UNGRADED),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "enrollments" })),
        );
    }

    ok(&req.id, json!({ "grade": grade::UNGRADED }))
}

fn handle_gpa_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_uid = match req.params.get("studentUid").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentUid", None),
    };

    let mut stmt = match conn.prepare("SELECT grade FROM enrollments WHERE student_uid = ?") {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let grades: Result<Vec<String>, _> = stmt
        .query_map([&student_uid], |row| row.get(0))
        .and_then(|it| it.collect());
    let grades = match grades {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let gpa = grade::grade_point_average(grades.iter().map(|g| g.as_str()));
    ok(&req.id, json!({ "gpa": gpa }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollments.list" => Some(handle_enrollments_list(state, req)),
        "classwork.get" => Some(handle_classwork_get(state, req)),
        "submissions.submit" => Some(handle_submissions_submit(state, req)),
        "enrollments.create" => Some(handle_enrollments_create(state, req)),
        "gpa.get" => Some(handle_gpa_get(state, req)),
        _ => None,
    }
}
