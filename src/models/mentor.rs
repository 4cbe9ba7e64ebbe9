//! Mentor data types

use serde::{Deserialize, Serialize};

/// A mentor, identified over SMS by phone number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mentor {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    /// Always the last 10 digits of the number as entered
    pub phone_number: String,
}

impl Mentor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Fields for creating a mentor
#[derive(Debug, Clone)]
pub struct NewMentor {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
}

/// Strip everything but digits and keep the last 10.
///
/// Returns `None` when fewer than 10 digits remain, so "+1 (555) 123-4567"
/// and "555.123.4567" both map to "5551234567" while "12345" matches nothing.
pub fn normalize_phone_number(raw: &str) -> Option<String> {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 10 {
        return None;
    }

    Some(digits[digits.len() - 10..].iter().collect())
}
