//! Lab session manager
//!
//! Student self sign-in plus the administrator pages for creating, editing,
//! closing and deleting lab sessions.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{Html, Redirect};
use axum::{Extension, Form};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use rusqlite::Connection;
use serde::Deserialize;

use super::{non_empty, redirect_back, referrer};
use crate::auth::CurrentUser;
use crate::db::queries;
use crate::error::AppError;
use crate::models::lab_session::{LabSession, NewLabSession, SignOutBy};
use crate::models::student::{parse_student_id, Student};
use crate::models::user::Permission;
use crate::views::{self, LabSessionFormView};
use crate::AppState;

/// Header set by the reverse proxy in front of the lab kiosk
const REAL_IP_HEADER: &str = "x-real-ip";

/// Wall-clock formats accepted besides RFC 3339, read in server-local time
const LOCAL_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Deserialize)]
pub struct SignInForm {
    #[serde(default)]
    pub student_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LabSessionForm {
    #[serde(default)]
    pub time_in: String,
    #[serde(default)]
    pub time_out: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub referrer: String,
}

#[derive(Debug, Deserialize)]
pub struct ReferrerForm {
    #[serde(default)]
    pub referrer: String,
}

fn open_session_exists(student_id: i64) -> AppError {
    AppError::bad_request(format!(
        "An open lab session already exists for student {student_id}."
    ))
}

fn invalid_student() -> AppError {
    AppError::bad_request("Invalid student.")
}

fn invalid_lab_session() -> AppError {
    AppError::bad_request("Invalid lab session.")
}

/// Parse a time typed into a form; blank input means no time
pub fn parse_form_time(raw: &str) -> Result<Option<DateTime<Utc>>, AppError> {
    let Some(raw) = non_empty(raw) else {
        return Ok(None);
    };

    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(time.with_timezone(&Utc)));
    }

    LOCAL_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|time| Some(time.with_timezone(&Utc)))
        .ok_or_else(|| AppError::bad_request("Invalid time."))
}

fn parse_session_times(
    form: &LabSessionForm,
) -> Result<(DateTime<Utc>, Option<DateTime<Utc>>), AppError> {
    let time_in = parse_form_time(&form.time_in)?.ok_or_else(|| AppError::bad_request("Invalid time."))?;
    let time_out = parse_form_time(&form.time_out)?;

    if time_out.is_some_and(|out| out < time_in) {
        return Err(AppError::bad_request("Sign-out time must be after sign-in time."));
    }

    Ok((time_in, time_out))
}

fn find_student(conn: &Connection, id: i64) -> Result<Student, AppError> {
    queries::get_student(conn, id)?.ok_or_else(invalid_student)
}

fn find_lab_session(conn: &Connection, id: i64) -> Result<LabSession, AppError> {
    queries::get_lab_session(conn, id)?.ok_or_else(invalid_lab_session)
}

/// Whether a client address matches the sign-in allowlist
pub fn ip_allowed(client_ip: Option<&str>, whitelist: &[String]) -> bool {
    if whitelist.is_empty() {
        return true;
    }

    client_ip.is_some_and(|ip| whitelist.iter().any(|prefix| ip.starts_with(prefix.as_str())))
}

/// Open a session for a student signing in at the lab kiosk
pub fn sign_in_student(
    conn: &Connection,
    raw_student_id: &str,
    client_ip: Option<&str>,
    whitelist: &[String],
    now: DateTime<Utc>,
) -> Result<i64, AppError> {
    let student_id = parse_student_id(raw_student_id).ok_or_else(invalid_student)?;
    let student = find_student(conn, student_id)?;

    if !ip_allowed(client_ip, whitelist) {
        return Err(AppError::bad_request(
            "Invalid IP address. Must sign in from the Robotics Lab.",
        ));
    }

    if queries::open_session_for_student(conn, student.id)?.is_some() {
        return Err(open_session_exists(student.id));
    }

    let id = queries::insert_lab_session(
        conn,
        student.id,
        &NewLabSession {
            time_in: now,
            ..Default::default()
        },
    )?;

    Ok(id)
}

/// Create a session from the administrator form
pub fn create_lab_session(
    conn: &Connection,
    student_id: i64,
    form: &LabSessionForm,
    acting_user: &str,
) -> Result<i64, AppError> {
    let student = find_student(conn, student_id)?;
    let (time_in, time_out) = parse_session_times(form)?;

    if time_out.is_none() && queries::open_session_for_student(conn, student.id)?.is_some() {
        return Err(open_session_exists(student.id));
    }

    let id = queries::insert_lab_session(
        conn,
        student.id,
        &NewLabSession {
            time_in,
            time_out,
            notes: non_empty(&form.notes).map(str::to_string),
            mentor_name: time_out.map(|_| acting_user.to_string()),
        },
    )?;

    Ok(id)
}

/// Sign-out attribution after an edit: set when a sign-out is added,
/// cleared when it is removed, otherwise kept
fn edited_mentor_name(
    session: &LabSession,
    time_out: Option<DateTime<Utc>>,
    acting_user: &str,
) -> Option<String> {
    match (session.time_out, time_out) {
        (None, Some(_)) => Some(acting_user.to_string()),
        (_, None) => None,
        (Some(_), Some(_)) => session.mentor_name.clone(),
    }
}

/// Apply the administrator edit form to an existing session
pub fn edit_lab_session(
    conn: &Connection,
    id: i64,
    form: &LabSessionForm,
    acting_user: &str,
) -> Result<(), AppError> {
    let session = find_lab_session(conn, id)?;
    let (time_in, time_out) = parse_session_times(form)?;

    if time_out.is_none() && !session.is_open() {
        if let Some(open) = queries::open_session_for_student(conn, session.student_id)? {
            if open.id != session.id {
                return Err(open_session_exists(session.student_id));
            }
        }
    }

    let mentor_name = edited_mentor_name(&session, time_out, acting_user);
    queries::update_lab_session(
        conn,
        id,
        time_in,
        time_out,
        non_empty(&form.notes),
        mentor_name.as_deref(),
    )?;

    Ok(())
}

/// Close a session as the acting administrator, even if it is already closed
pub fn force_sign_out(
    conn: &Connection,
    id: i64,
    now: DateTime<Utc>,
    acting_user: &str,
) -> Result<(), AppError> {
    find_lab_session(conn, id)?;
    queries::sign_out_lab_session(conn, id, now, &SignOutBy::Admin(acting_user.to_string()))?;
    Ok(())
}

pub fn render_index(state: &AppState) -> Result<String, AppError> {
    let sessions = state
        .db
        .with_connection(|conn| queries::open_sessions(conn, false))?;
    Ok(views::index(&sessions))
}

/// `GET /`
pub async fn index(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    Ok(Html(render_index(&state)?))
}

/// `POST /signin`
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<SignInForm>,
) -> Result<Redirect, AppError> {
    let client_ip = headers
        .get(REAL_IP_HEADER)
        .and_then(|value| value.to_str().ok());

    let id = state.db.with_connection(|conn| {
        sign_in_student(
            conn,
            &form.student_id,
            client_ip,
            &state.config.signin_ip_whitelist,
            Utc::now(),
        )
    })?;

    tracing::info!(lab_session_id = id, "Student signed in");
    Ok(Redirect::to("/"))
}

/// `GET /lab_sessions/open`
pub async fn open_lab_sessions(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    let sessions = state
        .db
        .with_connection(|conn| queries::open_sessions(conn, true))?;
    Ok(Html(views::signed_in_list(&sessions)))
}

/// `GET /students/:id/new_lab_session`
pub async fn new_lab_session_form(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(student_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Html<String>, AppError> {
    user.require(Permission::HoursEdit)?;
    let student = state.db.with_connection(|conn| find_student(conn, student_id))?;

    Ok(Html(views::edit_lab_session(&LabSessionFormView {
        title: format!("New Lab Session for {}", student.full_name()),
        action: format!("/students/{}/new_lab_session", student.id),
        referrer: referrer(&headers),
        ..Default::default()
    })))
}

/// `POST /students/:id/new_lab_session`
pub async fn new_lab_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(student_id): Path<i64>,
    Form(form): Form<LabSessionForm>,
) -> Result<Redirect, AppError> {
    let acting = user.require(Permission::HoursEdit)?.name_display();
    let id = state
        .db
        .with_connection(|conn| create_lab_session(conn, student_id, &form, &acting))?;

    tracing::info!(lab_session_id = id, student_id, user = %acting, "Lab session created");
    Ok(redirect_back(&form.referrer))
}

/// `GET /lab_sessions/:id/edit`
pub async fn edit_lab_session_form(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Html<String>, AppError> {
    user.require(Permission::HoursEdit)?;
    let (session, student) = state.db.with_connection(|conn| {
        let session = find_lab_session(conn, id)?;
        let student = find_student(conn, session.student_id)?;
        Ok::<_, AppError>((session, student))
    })?;

    Ok(Html(views::edit_lab_session(&LabSessionFormView {
        title: format!("Edit Lab Session for {}", student.full_name()),
        action: format!("/lab_sessions/{}/edit", session.id),
        time_in: Some(session.time_in),
        time_out: session.time_out,
        notes: session.notes.unwrap_or_default(),
        referrer: referrer(&headers),
    })))
}

/// `POST /lab_sessions/:id/edit`
pub async fn update_lab_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Form(form): Form<LabSessionForm>,
) -> Result<Redirect, AppError> {
    let acting = user.require(Permission::HoursEdit)?.name_display();
    state
        .db
        .with_connection(|conn| edit_lab_session(conn, id, &form, &acting))?;

    tracing::info!(lab_session_id = id, user = %acting, "Lab session edited");
    Ok(redirect_back(&form.referrer))
}

/// `GET /lab_sessions/:id/delete`
pub async fn delete_lab_session_form(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Html<String>, AppError> {
    user.require(Permission::HoursEdit)?;
    let (session, student) = state.db.with_connection(|conn| {
        let session = find_lab_session(conn, id)?;
        let student = find_student(conn, session.student_id)?;
        Ok::<_, AppError>((session, student))
    })?;

    Ok(Html(views::delete_lab_session(&session, &student, &referrer(&headers))))
}

/// `POST /lab_sessions/:id/delete`
pub async fn delete_lab_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Form(form): Form<ReferrerForm>,
) -> Result<Redirect, AppError> {
    let acting = user.require(Permission::HoursEdit)?.name_display();
    let deleted = state
        .db
        .with_connection(|conn| queries::delete_lab_session(conn, id))?;
    if !deleted {
        return Err(invalid_lab_session());
    }

    tracing::info!(lab_session_id = id, user = %acting, "Lab session deleted");
    Ok(redirect_back(&form.referrer))
}

/// `GET /lab_sessions/:id/sign_out`
pub async fn sign_out_lab_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Redirect, AppError> {
    let acting = user.require(Permission::HoursEdit)?.name_display();
    state
        .db
        .with_connection(|conn| force_sign_out(conn, id, Utc::now(), &acting))?;

    tracing::info!(lab_session_id = id, user = %acting, "Lab session signed out");
    Ok(Redirect::to("/"))
}
