//! CSV export functionality
//!
//! Fields are written verbatim; names are never quoted or escaped.

use std::io::Write;

use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::models::lab_session::format_hours;
use crate::models::student::StudentHours;

pub const HOURS_CSV_HEADER: [&str; 4] = ["Last Name", "First Name", "Student ID", "Project Hours"];

/// Write one row per student, in the order given
pub fn write_student_hours_csv<W: Write>(rows: &[StudentHours], out: W) -> Result<(), csv::Error> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(out);

    writer.write_record(HOURS_CSV_HEADER)?;
    for row in rows {
        let id = row.student.id.to_string();
        let hours = format_hours(row.project_hours);
        writer.write_record([
            row.student.last_name.as_str(),
            row.student.first_name.as_str(),
            id.as_str(),
            hours.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Render the student hours report as a string
pub fn student_hours_csv(rows: &[StudentHours]) -> Result<String, csv::Error> {
    let mut buf = Vec::new();
    write_student_hours_csv(rows, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
