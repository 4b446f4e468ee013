use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("lms.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            subject TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            department TEXT NOT NULL,
            number INTEGER NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(department) REFERENCES departments(subject),
            UNIQUE(department, number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_department ON courses(department)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS professors(
            uid TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            birth_date TEXT,
            department TEXT NOT NULL,
            FOREIGN KEY(department) REFERENCES departments(subject)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            uid TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            birth_date TEXT,
            major TEXT NOT NULL,
            FOREIGN KEY(major) REFERENCES departments(subject)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS administrators(
            uid TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            birth_date TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            season TEXT NOT NULL,
            year INTEGER NOT NULL,
            location TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            taught_by TEXT NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(taught_by) REFERENCES professors(uid),
            UNIQUE(course_id, season, year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_course ON classes(course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_taught_by ON classes(taught_by)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            weight INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(class_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_categories_class ON categories(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            category_id TEXT NOT NULL,
            name TEXT NOT NULL,
            max_points INTEGER NOT NULL,
            contents TEXT NOT NULL DEFAULT '',
            due TEXT NOT NULL,
            FOREIGN KEY(category_id) REFERENCES categories(id),
            UNIQUE(category_id, name)
        )",
        [],
    )?;
    ensure_assignments_contents(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_category ON assignments(category_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS submissions(
            assignment_id TEXT NOT NULL,
            student_uid TEXT NOT NULL,
            score INTEGER,
            solution TEXT,
            submitted_at TEXT,
            PRIMARY KEY(assignment_id, student_uid),
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            FOREIGN KEY(student_uid) REFERENCES students(uid)
        )",
        [],
    )?;
    ensure_submissions_solution(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissions_student ON submissions(student_uid)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            student_uid TEXT NOT NULL,
            class_id TEXT NOT NULL,
            grade TEXT NOT NULL DEFAULT '--',
            PRIMARY KEY(student_uid, class_id),
            FOREIGN KEY(student_uid) REFERENCES students(uid),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_class ON enrollments(class_id)",
        [],
    )?;

    Ok(conn)
}

// Early workspaces kept assignment bodies outside the database. Add the
// column and leave existing rows empty.
fn ensure_assignments_contents(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "assignments", "contents")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE assignments ADD COLUMN contents TEXT NOT NULL DEFAULT ''",
        [],
    )?;
    Ok(())
}

fn ensure_submissions_solution(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "submissions", "solution")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE submissions ADD COLUMN solution TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
