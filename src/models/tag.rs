//! RFID tag data types

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stored mapping from a physical tag to its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub tag_id: String,
    pub student_id: Option<i64>,
    pub mentor_id: Option<i64>,
}

/// Which foreign key a tag record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOwner {
    Student(i64),
    Mentor(i64),
    Neither,
}

impl Tag {
    pub fn owner(&self) -> TagOwner {
        match (self.student_id, self.mentor_id) {
            (Some(student_id), _) => TagOwner::Student(student_id),
            (None, Some(mentor_id)) => TagOwner::Mentor(mentor_id),
            (None, None) => TagOwner::Neither,
        }
    }
}

/// `mode` parameter of the tag assignment endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignMode {
    Student,
    Mentor,
}

impl FromStr for AssignMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(AssignMode::Student),
            "mentor" => Ok(AssignMode::Mentor),
            _ => Err(()),
        }
    }
}

impl AssignMode {
    /// The owner a tag gets when assigned in this mode
    pub fn owner(self, id: i64) -> TagOwner {
        match self {
            AssignMode::Student => TagOwner::Student(id),
            AssignMode::Mentor => TagOwner::Mentor(id),
        }
    }
}
