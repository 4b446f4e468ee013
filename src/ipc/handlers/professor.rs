use crate::grade;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// Everything the grade engine needs about one student in one class, read in
/// a single pass: each category's weight plus the (max points, score) pairs
/// for the assignments the student has submissions on.
fn class_score_snapshot(
    conn: &Connection,
    class_id: &str,
    student_uid: &str,
) -> rusqlite::Result<Vec<grade::CategoryScores>> {
    let mut cat_stmt = conn.prepare(
        "SELECT id, weight FROM categories WHERE class_id = ? ORDER BY name",
    )?;
    let cats: Vec<(String, i64)> = cat_stmt
        .query_map([class_id], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<_, _>>()?;

    let mut score_stmt = conn.prepare(
        "SELECT a.max_points, s.score
         FROM assignments a
         JOIN submissions s ON s.assignment_id = a.id AND s.student_uid = ?2
         WHERE a.category_id = ?1",
    )?;

    let mut out = Vec::with_capacity(cats.len());
    for (cat_id, weight) in cats {
        let scores = score_stmt
            .query_map((&cat_id, student_uid), |r| {
                let max_points: i64 = r.get(0)?;
                let score: Option<i64> = r.get(1)?;
                Ok(grade::SubmittedScore {
                    max_points: max_points as u32,
                    score: score.map(|v| v as u32),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        out.push(grade::CategoryScores {
            weight: weight as u32,
            scores,
        });
    }
    Ok(out)
}

fn handle_roster_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
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

    let mut stmt = match conn.prepare(
        "SELECT st.uid, st.first_name, st.last_name, st.birth_date, e.grade
         FROM enrollments e
         JOIN students st ON st.uid = e.student_uid
         WHERE e.class_id = ?
         ORDER BY st.last_name, st.first_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&class_id], |row| {
            let uid: String = row.get(0)?;
            let fname: String = row.get(1)?;
            let lname: String = row.get(2)?;
            let dob: Option<String> = row.get(3)?;
            let grade: String = row.get(4)?;
            Ok(json!({
                "uid": uid,
                "fname": fname,
                "lname": lname,
                "dob": dob,
                "grade": grade
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_categories_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, name, weight FROM categories WHERE class_id = ? ORDER BY name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&class_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let weight: i64 = row.get(2)?;
            Ok(json!({ "id": id, "name": name, "weight": weight }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(categories) => ok(&req.id, json!({ "categories": categories })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_categories_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    // Weights are relative; they do not have to sum to 100 across the class.
    let weight = match req.params.get("weight").and_then(|v| v.as_i64()) {
        Some(v) if v >= 0 => v,
        _ => {
            return err(
                &req.id,
                "bad_params",
                "weight must be a non-negative integer",
                None,
            )
        }
    };

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

    let dup: Option<String> = match conn
        .query_row(
            "SELECT id FROM categories WHERE class_id = ? AND name = ?",
            (&class_id, &name),
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
            "category already exists in class",
            Some(json!({ "name": name })),
        );
    }

    let category_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO categories(id, class_id, name, weight) VALUES(?, ?, ?, ?)",
        (&category_id, &class_id, &name, weight),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "categories" })),
        );
    }

    ok(
        &req.id,
        json!({ "categoryId": category_id, "name": name, "weight": weight }),
    )
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };
    let category_name = req
        .params
        .get("categoryName")
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    // Submission counts via a correlated subquery to avoid double-counting.
    let mut sql = String::from(
        "SELECT a.id, a.name, c.name, a.due, a.max_points,
                (SELECT COUNT(*) FROM submissions s WHERE s.assignment_id = a.id)
         FROM assignments a
         JOIN categories c ON c.id = a.category_id
         WHERE c.class_id = ?1",
    );
    if category_name.is_some() {
        sql.push_str(" AND c.name = ?2");
    }
    sql.push_str(" ORDER BY c.name, a.name");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let map_row = |row: &rusqlite::Row<'_>| {
        let id: String = row.get(0)?;
        let aname: String = row.get(1)?;
        let cname: String = row.get(2)?;
        let due: String = row.get(3)?;
        let max_points: i64 = row.get(4)?;
        let submissions: i64 = row.get(5)?;
        Ok(json!({
            "id": id,
            "aname": aname,
            "cname": cname,
            "due": due,
            "maxPoints": max_points,
            "submissions": submissions
        }))
    };

    let rows = match &category_name {
        Some(name) => stmt
            .query_map((&class_id, name), map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([&class_id], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    };

    match rows {
        Ok(assignments) => ok(&req.id, json!({ "assignments": assignments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };
    let category_name = match req.params.get("categoryName").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing categoryName", None),
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    let max_points = match req.params.get("maxPoints").and_then(|v| v.as_i64()) {
        Some(v) if v > 0 => v,
        _ => {
            return err(
                &req.id,
                "bad_params",
                "maxPoints must be a positive integer",
                None,
            )
        }
    };
    let due = match req.params.get("due").and_then(|v| v.as_str()) {
        Some(v) => {
            let trimmed = v.trim();
            let parsed = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S"));
            match parsed {
                Ok(t) => t.format("%Y-%m-%dT%H:%M:%S").to_string(),
                Err(_) => {
                    return err(
                        &req.id,
                        "bad_params",
                        "due must be yyyy-mm-ddThh:mm:ss",
                        None,
                    )
                }
            }
        }
        None => return err(&req.id, "bad_params", "missing due", None),
    };
    let contents = req
        .params
        .get("contents")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let category_id: Option<String> = match conn
        .query_row(
            "SELECT id FROM categories WHERE class_id = ? AND name = ?",
            (&class_id, &category_name),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(category_id) = category_id else {
        return err(&req.id, "not_found", "category not found", None);
    };

    let dup: Option<String> = match conn
        .query_row(
            "SELECT id FROM assignments WHERE category_id = ? AND name = ?",
            (&category_id, &name),
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
            "assignment already exists in category",
            Some(json!({ "name": name })),
        );
    }

    let assignment_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO assignments(id, category_id, name, max_points, contents, due)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &assignment_id,
            &category_id,
            &name,
            max_points,
            &contents,
            &due,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "assignments" })),
        );
    }

    ok(&req.id, json!({ "assignmentId": assignment_id }))
}

fn handle_submissions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let assignment_id = match req.params.get("assignmentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing assignmentId", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT st.first_name, st.last_name, st.uid, s.submitted_at, s.score
         FROM submissions s
         JOIN students st ON st.uid = s.student_uid
         WHERE s.assignment_id = ?
         ORDER BY st.last_name, st.first_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&assignment_id], |row| {
            let fname: String = row.get(0)?;
            let lname: String = row.get(1)?;
            let uid: String = row.get(2)?;
            let time: Option<String> = row.get(3)?;
            let score: Option<i64> = row.get(4)?;
            Ok(json!({
                "fname": fname,
                "lname": lname,
                "uid": uid,
                "time": time,
                "score": score
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(submissions) => ok(&req.id, json!({ "submissions": submissions })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

// Scoring a submission and refreshing the enrollment's letter grade must land
// together; a score without its recomputed grade would leave the roster lying.
fn handle_submissions_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let score = match req.params.get("score").and_then(|v| v.as_i64()) {
        Some(v) if v >= 0 => v,
        _ => {
            return err(
                &req.id,
                "bad_params",
                "score must be a non-negative integer",
                None,
            )
        }
    };

    let class_id: Option<String> = match conn
        .query_row(
            "SELECT c.class_id
             FROM assignments a
             JOIN categories c ON c.id = a.category_id
             WHERE a.id = ?",
            [&assignment_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(class_id) = class_id else {
        return err(&req.id, "not_found", "assignment not found", None);
    };

    let submission_exists: Option<i64> = match conn
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
    if submission_exists.is_none() {
        return err(&req.id, "not_found", "submission not found", None);
    }

    let enrolled: Option<i64> = match conn
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
    if enrolled.is_none() {
        return err(&req.id, "not_found", "student not enrolled in class", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if let Err(e) = tx.execute(
        "UPDATE submissions SET score = ? WHERE assignment_id = ? AND student_uid = ?",
        (score, &assignment_id, &student_uid),
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "submissions" })),
        );
    }

    let snapshot = match class_score_snapshot(&tx, &class_id, &student_uid) {
        Ok(v) => v,
        Err(e) => {
            let _ = tx.rollback();
            return err(&req.id, "db_query_failed", e.to_string(), None);
        }
    };
    let letter = grade::class_grade(&snapshot)
        .map(|g| g.as_str())
        .unwrap_or(grade::UNGRADED);

    if let Err(e) = tx.execute(
        "UPDATE enrollments SET grade = ? WHERE student_uid = ? AND class_id = ?",
        (letter, &student_uid, &class_id),
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "enrollments" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "grade": letter }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.get" => Some(handle_roster_get(state, req)),
        "categories.list" => Some(handle_categories_list(state, req)),
        "categories.create" => Some(handle_categories_create(state, req)),
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignments.create" => Some(handle_assignments_create(state, req)),
        "submissions.list" => Some(handle_submissions_list(state, req)),
        "submissions.grade" => Some(handle_submissions_grade(state, req)),
        _ => None,
    }
}
