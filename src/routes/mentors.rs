//! Mentor directory pages

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{Html, Redirect};
use axum::{Extension, Form};
use rusqlite::Connection;
use serde::Deserialize;

use super::non_empty;
use crate::auth::CurrentUser;
use crate::db::queries;
use crate::error::AppError;
use crate::models::mentor::{normalize_phone_number, NewMentor};
use crate::models::user::Permission;
use crate::views;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct MentorForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone_number: String,
}

impl MentorForm {
    /// Check required fields and normalize the phone number
    pub fn validate(&self) -> Result<NewMentor, AppError> {
        let first_name = non_empty(&self.first_name).ok_or_else(|| AppError::bad_request("Missing first name."))?;
        let last_name = non_empty(&self.last_name).ok_or_else(|| AppError::bad_request("Missing last name."))?;
        let phone_number = non_empty(&self.phone_number)
            .ok_or_else(|| AppError::bad_request("Missing phone number."))?;
        let phone_number = normalize_phone_number(phone_number)
            .ok_or_else(|| AppError::bad_request("Invalid phone number."))?;

        Ok(NewMentor {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            phone_number,
        })
    }
}

pub fn create_mentor(conn: &Connection, form: &MentorForm) -> Result<i64, AppError> {
    let mentor = form.validate()?;
    Ok(queries::insert_mentor(conn, &mentor)?)
}

/// `GET /mentors`
pub async fn list_mentors(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Html<String>, AppError> {
    user.require(Permission::HoursEdit)?;
    let mentors = state.db.with_connection(queries::list_mentors)?;
    Ok(Html(views::mentors(&mentors)))
}

/// `GET /new_mentor`
pub async fn new_mentor_form(Extension(user): Extension<CurrentUser>) -> Result<Html<String>, AppError> {
    user.require(Permission::HoursEdit)?;
    Ok(Html(views::new_mentor()))
}

/// `POST /mentors`
pub async fn new_mentor(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Form(form): Form<MentorForm>,
) -> Result<Redirect, AppError> {
    user.require(Permission::HoursEdit)?;
    let id = state.db.with_connection(|conn| create_mentor(conn, &form))?;

    tracing::info!(mentor_id = id, "Mentor created");
    Ok(Redirect::to("/mentors"))
}

/// `GET /mentors/:id/delete`
pub async fn delete_mentor_form(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Html<String>, AppError> {
    user.require(Permission::HoursEdit)?;
    let mentor = state
        .db
        .with_connection(|conn| queries::get_mentor(conn, id))?
        .ok_or_else(|| AppError::bad_request("Invalid mentor."))?;

    Ok(Html(views::delete_mentor(&mentor)))
}

/// `POST /mentors/:id/delete`
pub async fn delete_mentor(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Redirect, AppError> {
    user.require(Permission::HoursEdit)?;
    if !state.db.with_connection(|conn| queries::delete_mentor(conn, id))? {
        return Err(AppError::bad_request("Invalid mentor."));
    }

    tracing::info!(mentor_id = id, "Mentor deleted");
    Ok(Redirect::to("/mentors"))
}
