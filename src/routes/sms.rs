//! SMS command handler
//!
//! Mentors text student IDs to sign students out, or `gtfo` to clear the
//! lab. Replies are TwiML and always answered with 200.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::Form;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::{queries, DbError};
use crate::error::AppError;
use crate::models::lab_session::{format_hours, hours_between, SignOutBy};
use crate::models::mentor::normalize_phone_number;
use crate::models::student::parse_student_id;
use crate::views::escape;
use crate::AppState;

const SIGN_OUT_ALL_COMMAND: &str = "gtfo";

#[derive(Debug, Deserialize)]
pub struct SmsForm {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
}

/// Run the commands in one text message, returning the replies in order
pub fn process_sms(
    conn: &Connection,
    from: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<Vec<String>, DbError> {
    let mentor = match normalize_phone_number(from) {
        Some(phone_number) => queries::find_mentor_by_phone(conn, &phone_number)?,
        None => None,
    };
    let Some(mentor) = mentor else {
        return Ok(vec!["Error: Don't recognize sender's phone number.".to_string()]);
    };
    let by = SignOutBy::Mentor(mentor.id);

    if body.trim().eq_ignore_ascii_case(SIGN_OUT_ALL_COMMAND) {
        let closed = queries::sign_out_all_open(conn, now, &by)?;
        tracing::info!(mentor_id = mentor.id, closed, "Signed out all students");
        return Ok(vec!["All students signed out.".to_string()]);
    }

    let mut messages = Vec::new();
    for token in body.split_whitespace() {
        let student = match parse_student_id(token) {
            Some(id) => queries::get_student(conn, id)?,
            None => None,
        };
        let Some(student) = student else {
            messages.push("Error: No matching student.".to_string());
            continue;
        };

        let Some(session) = queries::open_session_for_student(conn, student.id)? else {
            messages.push(format!("Error: {} is not signed in.", student.full_name()));
            continue;
        };

        queries::sign_out_lab_session(conn, session.id, now, &by)?;
        messages.push(format!(
            "{} signed out after {} hours.",
            student.full_name(),
            format_hours(hours_between(session.time_in, now))
        ));
    }

    Ok(messages)
}

/// TwiML body with one `<Sms>` per message
pub fn sms_response(messages: &[String]) -> String {
    let mut body = String::from("<Response>");
    for message in messages {
        body.push_str("<Sms>");
        body.push_str(&escape(message));
        body.push_str("</Sms>");
    }
    body.push_str("</Response>");
    body
}

/// `POST /sms`
pub async fn receive_sms(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SmsForm>,
) -> Result<Response, AppError> {
    tracing::info!(from = %form.from, "SMS received");
    let messages = state
        .db
        .with_connection(|conn| process_sms(conn, &form.from, &form.body, Utc::now()))?;

    Ok(([(CONTENT_TYPE, "text/xml")], sms_response(&messages)).into_response())
}
