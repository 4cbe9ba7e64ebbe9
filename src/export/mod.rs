//! Report exports

pub mod csv_export;
