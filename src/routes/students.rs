//! Student directory: leader board, student pages and re-indexing

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Html;
use axum::Extension;
use rusqlite::Connection;

use crate::auth::CurrentUser;
use crate::db::{queries, DbError};
use crate::error::AppError;
use crate::models::student::{Student, StudentHours};
use crate::models::user::{MemberUser, Permission};
use crate::views;
use crate::AppState;

/// Students ordered by project hours, most first
pub fn leader_board_rows(conn: &Connection) -> Result<Vec<StudentHours>, DbError> {
    let mut rows = queries::student_hours(conn)?;
    rows.sort_by(|a, b| b.project_hours.total_cmp(&a.project_hours));
    Ok(rows)
}

/// Upsert every member that has a school ID, returning how many were imported
pub fn import_students(conn: &Connection, members: &[MemberUser]) -> Result<usize, DbError> {
    let mut imported = 0;
    for member in members {
        let Some(bcp_id) = member.bcp_id else {
            tracing::warn!(member_id = member.id, "Skipping member without a school ID");
            continue;
        };

        queries::upsert_student(
            conn,
            &Student {
                id: bcp_id,
                first_name: member.first_name.clone(),
                last_name: member.last_name.clone(),
            },
        )?;
        imported += 1;
    }

    Ok(imported)
}

/// `GET /leader_board`
pub async fn leader_board(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    let rows = state.db.with_connection(leader_board_rows)?;
    Ok(Html(views::leader_board(&rows)))
}

/// `GET /students/:id`
pub async fn student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Html<String>, AppError> {
    let (student, sessions) = state.db.with_connection(|conn| {
        let student = queries::get_student(conn, id)?
            .ok_or_else(|| AppError::bad_request("Invalid student."))?;
        let sessions = queries::sessions_for_student(conn, id)?;
        Ok::<_, AppError>((student, sessions))
    })?;

    let project_hours: f64 = sessions.iter().filter_map(|s| s.duration_hours()).sum();
    Ok(Html(views::student(&student, &sessions, project_hours)))
}

/// `GET /reindex_students`
pub async fn reindex_students(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<String, AppError> {
    user.require_or(
        Permission::HoursEdit,
        AppError::bad_request("Need to be an administrator."),
    )?;

    let members = state
        .auth
        .users_with_permission(Permission::HoursSignIn)
        .await?;
    let imported = state
        .db
        .with_connection(|conn| import_students(conn, &members))?;

    tracing::info!(imported, "Re-indexed students");
    Ok(format!("Successfully imported {imported} students."))
}
