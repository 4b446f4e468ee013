use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_departments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "departments": [] }));
    };

    let mut stmt = match conn.prepare("SELECT subject, name FROM departments ORDER BY subject") {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let subject: String = row.get(0)?;
            let name: String = row.get(1)?;
            Ok(json!({ "subject": subject, "name": name }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(departments) => ok(&req.id, json!({ "departments": departments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_catalog_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "departments": [] }));
    };

    let mut dept_stmt = match conn.prepare("SELECT subject, name FROM departments ORDER BY subject")
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let departments: Result<Vec<(String, String)>, _> = dept_stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .and_then(|it| it.collect());
    let departments = match departments {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut course_stmt = match conn.prepare(
        "SELECT number, name FROM courses WHERE department = ? ORDER BY number",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut out = Vec::with_capacity(departments.len());
    for (subject, dname) in departments {
        let courses = course_stmt
            .query_map([&subject], |row| {
                let number: i64 = row.get(0)?;
                let cname: String = row.get(1)?;
                Ok(json!({ "number": number, "cname": cname }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>());
        let courses = match courses {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        out.push(json!({ "subject": subject, "dname": dname, "courses": courses }));
    }

    ok(&req.id, json!({ "departments": out }))
}

fn handle_courses_offerings(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let subject = match req.params.get("subject").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing subject", None),
    };
    let number = match req.params.get("number").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing number", None),
    };

    let course_id: Option<String> = match conn
        .query_row(
            "SELECT id FROM courses WHERE department = ? AND number = ?",
            (&subject, number),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(course_id) = course_id else {
        return err(&req.id, "not_found", "course not found", None);
    };

    let mut stmt = match conn.prepare(
        "SELECT c.season, c.year, c.location, c.start_time, c.end_time,
                p.first_name, p.last_name
         FROM classes c
         JOIN professors p ON p.uid = c.taught_by
         WHERE c.course_id = ?
         ORDER BY c.year, c.season",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&course_id], |row| {
            let season: String = row.get(0)?;
            let year: i64 = row.get(1)?;
            let location: String = row.get(2)?;
            let start: String = row.get(3)?;
            let end: String = row.get(4)?;
            let fname: String = row.get(5)?;
            let lname: String = row.get(6)?;
            Ok(json!({
                "season": season,
                "year": year,
                "location": location,
                "start": start,
                "end": end,
                "fname": fname,
                "lname": lname
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(offerings) => ok(&req.id, json!({ "offerings": offerings })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

// Students report their major as the department, professors the one they
// teach in, administrators none.
fn handle_users_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let uid = match req.params.get("uid").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing uid", None),
    };

    let student: Option<(String, String, String)> = match conn
        .query_row(
            "SELECT first_name, last_name, major FROM students WHERE uid = ?",
            [&uid],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some((fname, lname, major)) = student {
        return ok(
            &req.id,
            json!({ "fname": fname, "lname": lname, "uid": uid, "role": "student", "department": major }),
        );
    }

    let professor: Option<(String, String, String)> = match conn
        .query_row(
            "SELECT first_name, last_name, department FROM professors WHERE uid = ?",
            [&uid],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some((fname, lname, department)) = professor {
        return ok(
            &req.id,
            json!({ "fname": fname, "lname": lname, "uid": uid, "role": "professor", "department": department }),
        );
    }

    let admin: Option<(String, String)> = match conn
        .query_row(
            "SELECT first_name, last_name FROM administrators WHERE uid = ?",
            [&uid],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some((fname, lname)) = admin {
        return ok(
            &req.id,
            json!({ "fname": fname, "lname": lname, "uid": uid, "role": "administrator" }),
        );
    }

    err(&req.id, "not_found", "user not found", None)
}

fn handle_assignments_contents(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let assignment_id = match req.params.get("assignmentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing assignmentId", None),
    };

    let contents: Option<String> = match conn
        .query_row(
            "SELECT contents FROM assignments WHERE id = ?",
            [&assignment_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match contents {
        Some(contents) => ok(&req.id, json!({ "contents": contents })),
        None => err(&req.id, "not_found", "assignment not found", None),
    }
}

fn handle_submissions_text(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    // No submission reads as empty text, not as an error.
    let solution: Option<Option<String>> = match conn
        .query_row(
            "SELECT solution FROM submissions WHERE assignment_id = ? AND student_uid = ?",
            (&assignment_id, &student_uid),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let text = solution.flatten().unwrap_or_default();
    ok(&req.id, json!({ "text": text }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "departments.list" => Some(handle_departments_list(state, req)),
        "catalog.get" => Some(handle_catalog_get(state, req)),
        "courses.offerings" => Some(handle_courses_offerings(state, req)),
        "users.get" => Some(handle_users_get(state, req)),
        "assignments.contents" => Some(handle_assignments_contents(state, req)),
        "submissions.text" => Some(handle_submissions_text(state, req)),
        _ => None,
    }
}
