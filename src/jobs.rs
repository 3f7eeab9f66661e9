//! Per-job scripts: rendering them from the job database, and running the copy/clean helpers

/// Render run, copy and clean scripts for selected jobs
pub mod scripts;

/// Run copy and clean scripts through bash
pub mod helpers;
