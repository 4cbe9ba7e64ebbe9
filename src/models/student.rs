//! Student data types

use serde::{Deserialize, Serialize};

/// A student, keyed by their external school ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Student together with the sum of their closed lab session durations
#[derive(Debug, Clone, Serialize)]
pub struct StudentHours {
    pub student: Student,
    pub project_hours: f64,
}

/// Parse a student identifier as typed into a form or SMS body
pub fn parse_student_id(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}
