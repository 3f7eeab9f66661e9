//! Job database and submission registry
//!
//! Jobs come from a CSV table copied into the working directory at init. Prepared submissions are
//! remembered in a SQLite registry next to it.

/// Read and validate the CSV job table
pub mod table;
/// Connect to the SQLite submission registry
pub mod open;
/// Record, look up, and update prepared submissions
pub mod submission;
