//! Lab session data types
//!
//! A lab session is one sign-in/sign-out pair for a student.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single stay in the lab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabSession {
    pub id: i64,
    pub student_id: i64,
    pub time_in: DateTime<Utc>,
    /// `None` while the student is still signed in
    pub time_out: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Set when an administrator signs the student out from the web
    pub mentor_name: Option<String>,
    /// Set when a mentor signs the student out over SMS or RFID
    pub mentor_id: Option<i64>,
    /// Display name of whoever signed the session out, resolved from either field
    pub signed_out_by: Option<String>,
}

impl LabSession {
    pub fn is_open(&self) -> bool {
        self.time_out.is_none()
    }

    /// Length of the session in hours, undefined while it is open
    pub fn duration_hours(&self) -> Option<f64> {
        self.time_out.map(|out| hours_between(self.time_in, out))
    }
}

/// Fields for creating a lab session
#[derive(Debug, Clone, Default)]
pub struct NewLabSession {
    pub time_in: DateTime<Utc>,
    pub time_out: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub mentor_name: Option<String>,
}

/// Who closed a session
#[derive(Debug, Clone, PartialEq)]
pub enum SignOutBy {
    /// Web user, recorded by display name
    Admin(String),
    /// Registered mentor, recorded by id
    Mentor(i64),
}

pub fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 3_600_000.0
}

/// Hours rounded to one decimal place for messages
pub fn format_hours(hours: f64) -> String {
    format!("{:.1}", hours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn session(time_out: Option<DateTime<Utc>>) -> LabSession {
        LabSession {
            id: 1,
            student_id: 254,
            time_in: Utc.with_ymd_and_hms(2026, 2, 5, 15, 0, 0).unwrap(),
            time_out,
            notes: None,
            mentor_name: None,
            mentor_id: None,
            signed_out_by: None,
        }
    }

    #[test]
    fn test_open_session_has_no_duration() {
        let open = session(None);
        assert!(open.is_open());
        assert_eq!(open.duration_hours(), None);
    }

    #[test]
    fn test_duration_hours() {
        let time_in = Utc.with_ymd_and_hms(2026, 2, 5, 15, 0, 0).unwrap();
        let closed = session(Some(time_in + Duration::minutes(150)));
        assert!(!closed.is_open());
        assert_eq!(closed.duration_hours(), Some(2.5));
    }

    #[test]
    fn test_format_hours() {
        assert_eq!(format_hours(2.0), "2.0");
        assert_eq!(format_hours(1.26), "1.3");
        assert_eq!(format_hours(0.04), "0.0");
    }
}
