//! Data models module
//!
//! Contains all data structures used throughout the application:
//! - Students, mentors and their lab sessions
//! - RFID tag ownership
//! - Users resolved from the member service

pub mod lab_session;
pub mod mentor;
pub mod student;
pub mod tag;
pub mod user;
