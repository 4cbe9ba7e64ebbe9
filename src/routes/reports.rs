//! CSV and strike reports

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{Html, IntoResponse, Response};
use axum::Extension;
use chrono::Utc;

use crate::auth::CurrentUser;
use crate::db::queries;
use crate::error::AppError;
use crate::export::csv_export::student_hours_csv;
use crate::models::user::Permission;
use crate::trends::weekly::build_strike_report;
use crate::views;
use crate::AppState;

/// `GET /csv_report`
pub async fn csv_report(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Response, AppError> {
    user.require(Permission::HoursViewReport)?;
    let rows = state.db.with_connection(queries::student_hours)?;
    let body = student_hours_csv(&rows)?;

    Ok((
        [
            (CONTENT_TYPE, "text/csv"),
            (CONTENT_DISPOSITION, "attachment; filename=\"hours.csv\""),
        ],
        body,
    )
        .into_response())
}

/// `GET /strike_report`
pub async fn strike_report(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Html<String>, AppError> {
    user.require(Permission::HoursViewReport)?;
    let report = state.db.with_connection(|conn| {
        build_strike_report(
            conn,
            state.config.strike_epoch,
            state.config.strike_min_hours,
            Utc::now(),
        )
    })?;

    Ok(Html(views::strike_report(&report)))
}
