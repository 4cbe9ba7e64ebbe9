//! Database schema definitions
//!
//! Contains SQL for creating all tables and indexes

use rusqlite::Connection;
use super::DbError;

/// SQL schema for all tables
const SCHEMA: &str = r#"
-- Students are keyed by their external school ID
CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_students_last_name ON students(last_name);

CREATE TABLE IF NOT EXISTS mentors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    phone_number TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_mentors_phone ON mentors(phone_number);

-- Sign-in/sign-out records
CREATE TABLE IF NOT EXISTS lab_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
    time_in TEXT NOT NULL,
    time_out TEXT,
    notes TEXT,
    mentor_name TEXT,
    mentor_id INTEGER REFERENCES mentors(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_lab_sessions_student ON lab_sessions(student_id, id);
CREATE INDEX IF NOT EXISTS idx_lab_sessions_open ON lab_sessions(time_out);

-- RFID tag ownership
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tag_id TEXT NOT NULL UNIQUE,
    student_id INTEGER REFERENCES students(id) ON DELETE SET NULL,
    mentor_id INTEGER REFERENCES mentors(id) ON DELETE SET NULL,
    CHECK (student_id IS NULL OR mentor_id IS NULL)
);
"#;

/// Create all database tables
pub fn create_tables(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('students', 'mentors', 'lab_sessions', 'tags')",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(count, 4);
    }

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
    }

    #[test]
    fn test_tag_cannot_reference_both() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO students (id, first_name, last_name) VALUES (1, 'A', 'B');
             INSERT INTO mentors (first_name, last_name, phone_number) VALUES ('C', 'D', '5551234567');",
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO tags (tag_id, student_id, mentor_id) VALUES ('abc', 1, 1)",
            [],
        );
        assert!(result.is_err());
    }
}
