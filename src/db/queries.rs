//! Database query implementations
//!
//! Contains functions for querying students, mentors, lab sessions and tags

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DbError;
use crate::models::lab_session::{LabSession, NewLabSession, SignOutBy};
use crate::models::mentor::{Mentor, NewMentor};
use crate::models::student::{Student, StudentHours};
use crate::models::tag::{Tag, TagOwner};

/// Lab session columns, with the sign-out attribution resolved from either
/// the admin name or the mentor record
const LAB_SESSION_SELECT: &str = r#"
    SELECT
        ls.id,
        ls.student_id,
        ls.time_in,
        ls.time_out,
        ls.notes,
        ls.mentor_name,
        ls.mentor_id,
        COALESCE(ls.mentor_name, m.first_name || ' ' || m.last_name) AS signed_out_by
    FROM lab_sessions ls
    LEFT JOIN mentors m ON m.id = ls.mentor_id
"#;

fn row_to_lab_session(row: &Row) -> rusqlite::Result<LabSession> {
    Ok(LabSession {
        id: row.get(0)?,
        student_id: row.get(1)?,
        time_in: row.get(2)?,
        time_out: row.get(3)?,
        notes: row.get(4)?,
        mentor_name: row.get(5)?,
        mentor_id: row.get(6)?,
        signed_out_by: row.get(7)?,
    })
}

fn row_to_student(row: &Row) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
    })
}

fn row_to_mentor(row: &Row) -> rusqlite::Result<Mentor> {
    Ok(Mentor {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        phone_number: row.get(3)?,
    })
}

fn row_to_tag(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        tag_id: row.get(1)?,
        student_id: row.get(2)?,
        mentor_id: row.get(3)?,
    })
}

// ============================================================================
// Students
// ============================================================================

/// Get a single student by ID
pub fn get_student(conn: &Connection, id: i64) -> Result<Option<Student>, DbError> {
    let student = conn
        .query_row(
            "SELECT id, first_name, last_name FROM students WHERE id = ?1",
            params![id],
            row_to_student,
        )
        .optional()?;

    Ok(student)
}

/// Get all students ordered by last name
pub fn list_students(conn: &Connection) -> Result<Vec<Student>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name FROM students ORDER BY last_name ASC, first_name ASC, id ASC",
    )?;

    let students = stmt
        .query_map([], row_to_student)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(students)
}

/// Insert a student or refresh the name of an existing one
pub fn upsert_student(conn: &Connection, student: &Student) -> Result<(), DbError> {
    conn.execute(
        r#"
        INSERT INTO students (id, first_name, last_name)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(id) DO UPDATE SET
            first_name = excluded.first_name,
            last_name = excluded.last_name
        "#,
        params![student.id, student.first_name, student.last_name],
    )?;

    Ok(())
}

pub fn count_students(conn: &Connection) -> Result<u32, DbError> {
    let count = conn.query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))?;
    Ok(count)
}

/// Get every student with their total closed-session hours, ordered by last name
pub fn student_hours(conn: &Connection) -> Result<Vec<StudentHours>, DbError> {
    let mut totals: HashMap<i64, f64> = HashMap::new();
    for session in closed_lab_sessions(conn)? {
        if let Some(hours) = session.duration_hours() {
            *totals.entry(session.student_id).or_insert(0.0) += hours;
        }
    }

    let hours = list_students(conn)?
        .into_iter()
        .map(|student| {
            let project_hours = totals.get(&student.id).copied().unwrap_or(0.0);
            StudentHours {
                student,
                project_hours,
            }
        })
        .collect();

    Ok(hours)
}

// ============================================================================
// Mentors
// ============================================================================

/// Insert a mentor, returning the new ID
pub fn insert_mentor(conn: &Connection, mentor: &NewMentor) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO mentors (first_name, last_name, phone_number) VALUES (?1, ?2, ?3)",
        params![mentor.first_name, mentor.last_name, mentor.phone_number],
    )?;

    Ok(conn.last_insert_rowid())
}

pub fn get_mentor(conn: &Connection, id: i64) -> Result<Option<Mentor>, DbError> {
    let mentor = conn
        .query_row(
            "SELECT id, first_name, last_name, phone_number FROM mentors WHERE id = ?1",
            params![id],
            row_to_mentor,
        )
        .optional()?;

    Ok(mentor)
}

/// Find a mentor by an already-normalized phone number
pub fn find_mentor_by_phone(conn: &Connection, phone_number: &str) -> Result<Option<Mentor>, DbError> {
    let mentor = conn
        .query_row(
            "SELECT id, first_name, last_name, phone_number FROM mentors WHERE phone_number = ?1 ORDER BY id LIMIT 1",
            params![phone_number],
            row_to_mentor,
        )
        .optional()?;

    Ok(mentor)
}

pub fn list_mentors(conn: &Connection) -> Result<Vec<Mentor>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, phone_number FROM mentors ORDER BY last_name ASC, first_name ASC",
    )?;

    let mentors = stmt
        .query_map([], row_to_mentor)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(mentors)
}

/// Delete a mentor; returns false if no such mentor existed
pub fn delete_mentor(conn: &Connection, id: i64) -> Result<bool, DbError> {
    let deleted = conn.execute("DELETE FROM mentors WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

// ============================================================================
// Lab sessions
// ============================================================================

pub fn get_lab_session(conn: &Connection, id: i64) -> Result<Option<LabSession>, DbError> {
    let sql = format!("{LAB_SESSION_SELECT} WHERE ls.id = ?1");
    let session = conn
        .query_row(&sql, params![id], row_to_lab_session)
        .optional()?;

    Ok(session)
}

/// Get the open session of a student, if any
pub fn open_session_for_student(
    conn: &Connection,
    student_id: i64,
) -> Result<Option<LabSession>, DbError> {
    let sql = format!(
        "{LAB_SESSION_SELECT} WHERE ls.student_id = ?1 AND ls.time_out IS NULL ORDER BY ls.id LIMIT 1"
    );
    let session = conn
        .query_row(&sql, params![student_id], row_to_lab_session)
        .optional()?;

    Ok(session)
}

/// Get the most recently created session of a student, open or closed
pub fn last_session_for_student(
    conn: &Connection,
    student_id: i64,
) -> Result<Option<LabSession>, DbError> {
    let sql = format!("{LAB_SESSION_SELECT} WHERE ls.student_id = ?1 ORDER BY ls.id DESC LIMIT 1");
    let session = conn
        .query_row(&sql, params![student_id], row_to_lab_session)
        .optional()?;

    Ok(session)
}

/// Get all sessions of a student in creation order
pub fn sessions_for_student(conn: &Connection, student_id: i64) -> Result<Vec<LabSession>, DbError> {
    let sql = format!("{LAB_SESSION_SELECT} WHERE ls.student_id = ?1 ORDER BY ls.id ASC");
    let mut stmt = conn.prepare(&sql)?;

    let sessions = stmt
        .query_map(params![student_id], row_to_lab_session)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(sessions)
}

/// Get all open sessions along with their students.
///
/// `ordered` sorts by session ID; otherwise rows come back in store order.
pub fn open_sessions(
    conn: &Connection,
    ordered: bool,
) -> Result<Vec<(LabSession, Student)>, DbError> {
    let sql = format!(
        r#"
        SELECT
            ls.id, ls.student_id, ls.time_in, ls.time_out, ls.notes, ls.mentor_name, ls.mentor_id,
            COALESCE(ls.mentor_name, m.first_name || ' ' || m.last_name),
            s.id, s.first_name, s.last_name
        FROM lab_sessions ls
        JOIN students s ON s.id = ls.student_id
        LEFT JOIN mentors m ON m.id = ls.mentor_id
        WHERE ls.time_out IS NULL
        {}
        "#,
        if ordered { "ORDER BY ls.id ASC" } else { "" }
    );
    let mut stmt = conn.prepare(&sql)?;

    let sessions = stmt
        .query_map([], |row| {
            let session = row_to_lab_session(row)?;
            let student = Student {
                id: row.get(8)?,
                first_name: row.get(9)?,
                last_name: row.get(10)?,
            };
            Ok((session, student))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(sessions)
}

/// Get every closed session, used for hour aggregation
pub fn closed_lab_sessions(conn: &Connection) -> Result<Vec<LabSession>, DbError> {
    let sql = format!("{LAB_SESSION_SELECT} WHERE ls.time_out IS NOT NULL ORDER BY ls.id ASC");
    let mut stmt = conn.prepare(&sql)?;

    let sessions = stmt
        .query_map([], row_to_lab_session)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(sessions)
}

/// Insert a lab session for a student, returning the new ID
pub fn insert_lab_session(
    conn: &Connection,
    student_id: i64,
    session: &NewLabSession,
) -> Result<i64, DbError> {
    conn.execute(
        r#"
        INSERT INTO lab_sessions (student_id, time_in, time_out, notes, mentor_name)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            student_id,
            session.time_in,
            session.time_out,
            session.notes,
            session.mentor_name
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Overwrite the editable fields of a lab session.
///
/// Reopening a session also drops any mentor attribution.
pub fn update_lab_session(
    conn: &Connection,
    id: i64,
    time_in: DateTime<Utc>,
    time_out: Option<DateTime<Utc>>,
    notes: Option<&str>,
    mentor_name: Option<&str>,
) -> Result<(), DbError> {
    conn.execute(
        r#"
        UPDATE lab_sessions
        SET time_in = ?2,
            time_out = ?3,
            notes = ?4,
            mentor_name = ?5,
            mentor_id = CASE WHEN ?3 IS NULL THEN NULL ELSE mentor_id END
        WHERE id = ?1
        "#,
        params![id, time_in, time_out, notes, mentor_name],
    )?;

    Ok(())
}

/// Close a single session
pub fn sign_out_lab_session(
    conn: &Connection,
    id: i64,
    time_out: DateTime<Utc>,
    by: &SignOutBy,
) -> Result<(), DbError> {
    match by {
        SignOutBy::Admin(name) => conn.execute(
            "UPDATE lab_sessions SET time_out = ?2, mentor_name = ?3 WHERE id = ?1",
            params![id, time_out, name],
        )?,
        SignOutBy::Mentor(mentor_id) => conn.execute(
            "UPDATE lab_sessions SET time_out = ?2, mentor_id = ?3 WHERE id = ?1",
            params![id, time_out, mentor_id],
        )?,
    };

    Ok(())
}

/// Close every open session, returning how many were closed
pub fn sign_out_all_open(
    conn: &Connection,
    time_out: DateTime<Utc>,
    by: &SignOutBy,
) -> Result<usize, DbError> {
    let closed = match by {
        SignOutBy::Admin(name) => conn.execute(
            "UPDATE lab_sessions SET time_out = ?1, mentor_name = ?2 WHERE time_out IS NULL",
            params![time_out, name],
        )?,
        SignOutBy::Mentor(mentor_id) => conn.execute(
            "UPDATE lab_sessions SET time_out = ?1, mentor_id = ?2 WHERE time_out IS NULL",
            params![time_out, mentor_id],
        )?,
    };

    Ok(closed)
}

/// Delete a lab session; returns false if no such session existed
pub fn delete_lab_session(conn: &Connection, id: i64) -> Result<bool, DbError> {
    let deleted = conn.execute("DELETE FROM lab_sessions WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

// ============================================================================
// Tags
// ============================================================================

/// Get a tag by its RFID tag ID
pub fn get_tag(conn: &Connection, tag_id: &str) -> Result<Option<Tag>, DbError> {
    let tag = conn
        .query_row(
            "SELECT id, tag_id, student_id, mentor_id FROM tags WHERE tag_id = ?1",
            params![tag_id],
            row_to_tag,
        )
        .optional()?;

    Ok(tag)
}

pub fn list_tags(conn: &Connection) -> Result<Vec<Tag>, DbError> {
    let mut stmt = conn.prepare("SELECT id, tag_id, student_id, mentor_id FROM tags ORDER BY id ASC")?;

    let tags = stmt
        .query_map([], row_to_tag)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(tags)
}

fn owner_columns(owner: TagOwner) -> (Option<i64>, Option<i64>) {
    match owner {
        TagOwner::Student(id) => (Some(id), None),
        TagOwner::Mentor(id) => (None, Some(id)),
        TagOwner::Neither => (None, None),
    }
}

/// Insert a new tag record
pub fn insert_tag(conn: &Connection, tag_id: &str, owner: TagOwner) -> Result<i64, DbError> {
    let (student_id, mentor_id) = owner_columns(owner);
    conn.execute(
        "INSERT INTO tags (tag_id, student_id, mentor_id) VALUES (?1, ?2, ?3)",
        params![tag_id, student_id, mentor_id],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Point an existing tag at a new owner, clearing the other reference
pub fn set_tag_owner(conn: &Connection, id: i64, owner: TagOwner) -> Result<(), DbError> {
    let (student_id, mentor_id) = owner_columns(owner);
    conn.execute(
        "UPDATE tags SET student_id = ?2, mentor_id = ?3 WHERE id = ?1",
        params![id, student_id, mentor_id],
    )?;

    Ok(())
}
