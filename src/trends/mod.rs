//! Weekly attendance trends
//!
//! Buckets lab hours into fixed seven-day windows counted from a configured
//! epoch and flags weeks below the required minimum.

pub mod weekly;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::models::student::Student;

/// One seven-day reporting window, `[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportWeek {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// Whether the window had already ended when the report was built
    pub complete: bool,
}

/// Hours of one student in every report week
#[derive(Debug, Clone, Serialize)]
pub struct StudentWeeklyHours {
    pub student: Student,
    /// Parallel to `StrikeReport::weeks`
    pub weekly_hours: Vec<f64>,
    /// Completed weeks below the minimum
    pub strikes: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrikeReport {
    pub weeks: Vec<ReportWeek>,
    pub students: Vec<StudentWeeklyHours>,
    pub min_hours: f64,
}
