//! Weekly strike calculations

use chrono::{DateTime, Duration, FixedOffset, Utc};
use rusqlite::Connection;

use super::{ReportWeek, StrikeReport, StudentWeeklyHours};
use crate::db::{queries, DbError};
use crate::models::lab_session::LabSession;
use crate::models::student::Student;

/// Build consecutive seven-day windows from `epoch`.
///
/// The first window is always produced; windows are added until one ends
/// at or after `now`.
pub fn report_weeks(epoch: DateTime<FixedOffset>, now: DateTime<Utc>) -> Vec<ReportWeek> {
    let mut weeks = Vec::new();
    let mut start = epoch;

    loop {
        let end = start + Duration::days(7);
        weeks.push(ReportWeek {
            start,
            end,
            complete: end <= now,
        });
        start = end;
        if start >= now {
            break;
        }
    }

    weeks
}

/// Index of the window containing `time`, if any
fn week_index(weeks: &[ReportWeek], time: DateTime<Utc>) -> Option<usize> {
    weeks
        .iter()
        .position(|week| week.start <= time && time < week.end)
}

/// Sum closed-session hours per student per week, keyed by sign-in time
pub fn aggregate_weekly_hours(
    weeks: &[ReportWeek],
    students: Vec<Student>,
    sessions: &[LabSession],
    min_hours: f64,
) -> Vec<StudentWeeklyHours> {
    students
        .into_iter()
        .map(|student| {
            let mut weekly_hours = vec![0.0; weeks.len()];
            for session in sessions.iter().filter(|s| s.student_id == student.id) {
                let (Some(index), Some(hours)) =
                    (week_index(weeks, session.time_in), session.duration_hours())
                else {
                    continue;
                };
                weekly_hours[index] += hours;
            }

            let strikes = weeks
                .iter()
                .zip(&weekly_hours)
                .filter(|(week, hours)| week.complete && **hours < min_hours)
                .count() as u32;

            StudentWeeklyHours {
                student,
                weekly_hours,
                strikes,
            }
        })
        .collect()
}

/// Assemble the strike report for every student
pub fn build_strike_report(
    conn: &Connection,
    epoch: DateTime<FixedOffset>,
    min_hours: f64,
    now: DateTime<Utc>,
) -> Result<StrikeReport, DbError> {
    let weeks = report_weeks(epoch, now);
    let students = queries::list_students(conn)?;
    let sessions = queries::closed_lab_sessions(conn)?;

    let students = aggregate_weekly_hours(&weeks, students, &sessions, min_hours);

    Ok(StrikeReport {
        weeks,
        students,
        min_hours,
    })
}
