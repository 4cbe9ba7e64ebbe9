//! RFID tag management and live view pages

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::Extension;
use rusqlite::Connection;
use serde::Deserialize;

use super::non_empty;
use crate::auth::CurrentUser;
use crate::db::queries;
use crate::error::AppError;
use crate::models::tag::{AssignMode, TagOwner};
use crate::models::user::Permission;
use crate::views;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AssignParams {
    pub tag: Option<String>,
    pub mode: Option<String>,
    pub id: Option<String>,
}

fn require_tag_admin(user: &CurrentUser) -> Result<(), AppError> {
    user.require_or(
        Permission::HoursManageTags,
        AppError::forbidden("Need to be an administrator."),
    )?;
    Ok(())
}

/// Create a tag record or point an existing one at a new owner
pub fn assign_tag(conn: &Connection, params: &AssignParams) -> Result<TagOwner, AppError> {
    let tag_id = params
        .tag
        .as_deref()
        .and_then(non_empty)
        .ok_or_else(|| AppError::bad_request("Parameter 'tag' is missing."))?;
    let mode: AssignMode = params
        .mode
        .as_deref()
        .and_then(|mode| mode.trim().parse().ok())
        .ok_or_else(|| AppError::bad_request("Parameter 'mode' is missing."))?;
    let id: i64 = params
        .id
        .as_deref()
        .and_then(|id| id.trim().parse().ok())
        .ok_or_else(|| AppError::bad_request("Parameter 'id' is missing."))?;

    match mode {
        AssignMode::Student if queries::get_student(conn, id)?.is_none() => {
            return Err(AppError::bad_request("Invalid student."));
        }
        AssignMode::Mentor if queries::get_mentor(conn, id)?.is_none() => {
            return Err(AppError::bad_request("Invalid mentor."));
        }
        _ => {}
    }

    let owner = mode.owner(id);
    match queries::get_tag(conn, tag_id)? {
        Some(tag) => queries::set_tag_owner(conn, tag.id, owner)?,
        None => {
            queries::insert_tag(conn, tag_id, owner)?;
        }
    }

    Ok(owner)
}

/// `GET /tag/manage`
pub async fn manage(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Html<String>, AppError> {
    require_tag_admin(&user)?;
    let (tags, students, mentors) = state.db.with_connection(|conn| {
        Ok::<_, AppError>((
            queries::list_tags(conn)?,
            queries::list_students(conn)?,
            queries::list_mentors(conn)?,
        ))
    })?;

    Ok(Html(views::tag_manage(&tags, &students, &mentors)))
}

/// `GET /tag/manage/assign?tag=&mode=&id=`
pub async fn assign(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<AssignParams>,
) -> Result<StatusCode, AppError> {
    require_tag_admin(&user)?;
    let owner = state.db.with_connection(|conn| assign_tag(conn, &params))?;

    tracing::info!(tag = ?params.tag, ?owner, "Tag assigned");
    Ok(StatusCode::OK)
}

/// `GET /tag/live`
pub async fn live() -> Html<String> {
    Html(views::live_tag_view())
}
