use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveTime;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_departments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let subject = match req.params.get("subject").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing subject", None),
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM departments WHERE subject = ?",
            [&subject],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_some() {
        return err(
            &req.id,
            "conflict",
            "department already exists",
            Some(json!({ "subject": subject })),
        );
    }

    if let Err(e) = conn.execute(
        "INSERT INTO departments(subject, name) VALUES(?, ?)",
        (&subject, &name),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "departments" })),
        );
    }

    ok(&req.id, json!({ "subject": subject, "name": name }))
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let subject = match req.params.get("subject").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing subject", None),
    };
    let number = match req.params.get("number").and_then(|v| v.as_i64()) {
        Some(v) if v > 0 => v,
        _ => return err(&req.id, "bad_params", "number must be a positive integer", None),
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };

    let dept_exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM departments WHERE subject = ?",
            [&subject],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if dept_exists.is_none() {
        return err(&req.id, "not_found", "department not found", None);
    }

    let dup: Option<String> = match conn
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
    if dup.is_some() {
        return err(
            &req.id,
            "conflict",
            "course already exists",
            Some(json!({ "subject": subject, "number": number })),
        );
    }

    let course_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(id, department, number, name) VALUES(?, ?, ?, ?)",
        (&course_id, &subject, number, &name),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }

    ok(
        &req.id,
        json!({ "courseId": course_id, "subject": subject, "number": number, "name": name }),
    )
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let subject = match req.params.get("subject").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing subject", None),
    };
    let number = match req.params.get("number").and_then(|v| v.as_i64()) {
        Some(v) if v > 0 => v,
        _ => return err(&req.id, "bad_params", "number must be a positive integer", None),
    };
    let season = match req.params.get("season").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing season", None),
    };
    let year = match req.params.get("year").and_then(|v| v.as_i64()) {
        Some(v) if v > 0 => v,
        _ => return err(&req.id, "bad_params", "year must be a positive integer", None),
    };
    let location = match req.params.get("location").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing location", None),
    };
    let start = match req.params.get("start").and_then(|v| v.as_str()) {
        Some(v) => match NaiveTime::parse_from_str(v.trim(), "%H:%M:%S") {
            Ok(t) => t.format("%H:%M:%S").to_string(),
            Err(_) => return err(&req.id, "bad_params", "start must be hh:mm:ss", None),
        },
        None => return err(&req.id, "bad_params", "missing start", None),
    };
    let end = match req.params.get("end").and_then(|v| v.as_str()) {
        Some(v) => match NaiveTime::parse_from_str(v.trim(), "%H:%M:%S") {
            Ok(t) => t.format("%H:%M:%S").to_string(),
            Err(_) => return err(&req.id, "bad_params", "end must be hh:mm:ss", None),
        },
        None => return err(&req.id, "bad_params", "missing end", None),
    };
    let professor_uid = match req.params.get("professorUid").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing professorUid", None),
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

    let prof_exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM professors WHERE uid = ?",
            [&professor_uid],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if prof_exists.is_none() {
        return err(&req.id, "not_found", "professor not found", None);
    }

    // One offering of a course per semester.
    let dup: Option<String> = match conn
        .query_row(
            "SELECT id FROM classes WHERE course_id = ? AND season = ? AND year = ?",
            (&course_id, &season, year),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if dup.is_some() {
        return err(
            &req.id,
            "conflict",
            "class already offered that semester",
            Some(json!({ "season": season, "year": year })),
        );
    }

    let class_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, course_id, season, year, location, start_time, end_time, taught_by)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &class_id,
            &course_id,
            &season,
            year,
            &location,
            &start,
            &end,
            &professor_uid,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    ok(&req.id, json!({ "classId": class_id }))
}

fn handle_users_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let role = match req.params.get("role").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_ascii_lowercase(),
        None => return err(&req.id, "bad_params", "missing role", None),
    };
    let first_name = match req.params.get("firstName").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing firstName", None),
    };
    let last_name = match req.params.get("lastName").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing lastName", None),
    };
    let birth_date = req
        .params
        .get("birthDate")
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string());
    let uid = match req.params.get("uid").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => format!("u{}", &Uuid::new_v4().simple().to_string()[..7]),
    };

    let taken = ["students", "professors", "administrators"].iter().find_map(|table| {
        let sql = format!("SELECT 1 FROM {} WHERE uid = ?", table);
        match conn.query_row(&sql, [&uid], |r| r.get::<_, i64>(0)).optional() {
            Ok(Some(_)) => Some(Ok(*table)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    });
    match taken {
        Some(Ok(table)) => {
            return err(
                &req.id,
                "conflict",
                "uid already in use",
                Some(json!({ "table": table })),
            )
        }
        Some(Err(e)) => return err(&req.id, "db_query_failed", e.to_string(), None),
        None => {}
    }

    match role.as_str() {
        "student" | "professor" => {
            let department = match req.params.get("department").and_then(|v| v.as_str()) {
                Some(v) if !v.trim().is_empty() => v.trim().to_string(),
                _ => return err(&req.id, "bad_params", "missing department", None),
            };
            let dept_exists: Option<i64> = match conn
                .query_row(
                    "SELECT 1 FROM departments WHERE subject = ?",
                    [&department],
                    |r| r.get(0),
                )
                .optional()
            {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            if dept_exists.is_none() {
                return err(&req.id, "not_found", "department not found", None);
            }

            let sql = if role == "student" {
                "INSERT INTO students(uid, first_name, last_name, birth_date, major)
                 VALUES(?, ?, ?, ?, ?)"
            } else {
                "INSERT INTO professors(uid, first_name, last_name, birth_date, department)
                 VALUES(?, ?, ?, ?, ?)"
            };
            if let Err(e) = conn.execute(
                sql,
                (&uid, &first_name, &last_name, &birth_date, &department),
            ) {
                return err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "role": role })),
                );
            }
        }
        "administrator" => {
            if let Err(e) = conn.execute(
                "INSERT INTO administrators(uid, first_name, last_name, birth_date)
                 VALUES(?, ?, ?, ?)",
                (&uid, &first_name, &last_name, &birth_date),
            ) {
                return err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "role": role })),
                );
            }
        }
        _ => {
            return err(
                &req.id,
                "bad_params",
                "role must be student, professor or administrator",
                None,
            )
        }
    }

    ok(&req.id, json!({ "uid": uid, "role": role }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "departments.create" => Some(handle_departments_create(state, req)),
        "courses.create" => Some(handle_courses_create(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "users.create" => Some(handle_users_create(state, req)),
        _ => None,
    }
}
