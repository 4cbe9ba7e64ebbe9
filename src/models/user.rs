//! Users resolved from the member service
//!
//! Web users are never stored locally; the member service owns their
//! identity and permissions.

use serde::{Deserialize, Serialize};

/// Permissions granted by the member service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Create, edit and delete lab sessions and mentors
    HoursEdit,
    /// Download the CSV and strike reports
    HoursViewReport,
    /// Assign RFID tags
    HoursManageTags,
    /// Marks a member as a student who signs in to the lab
    HoursSignIn,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::HoursEdit => "HOURS_EDIT",
            Permission::HoursViewReport => "HOURS_VIEW_REPORT",
            Permission::HoursManageTags => "HOURS_MANAGE_TAGS",
            Permission::HoursSignIn => "HOURS_SIGN_IN",
        }
    }
}

/// A member as returned by the member service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberUser {
    pub id: i64,
    /// School ID, present for students
    #[serde(default)]
    pub bcp_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl MemberUser {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.iter().any(|p| p == permission.as_str())
    }

    pub fn name_display(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_permission() {
        let user = MemberUser {
            id: 1,
            bcp_id: None,
            first_name: "Pat".to_string(),
            last_name: "Mentor".to_string(),
            permissions: vec!["HOURS_EDIT".to_string()],
        };

        assert!(user.has_permission(Permission::HoursEdit));
        assert!(!user.has_permission(Permission::HoursViewReport));
        assert_eq!(user.name_display(), "Pat Mentor");
    }

    #[test]
    fn test_deserialize_without_optional_fields() {
        let json = r#"{"id": 3, "first_name": "Sam", "last_name": "Student"}"#;
        let user: MemberUser = serde_json::from_str(json).unwrap();
        assert_eq!(user.bcp_id, None);
        assert!(user.permissions.is_empty());
    }
}
