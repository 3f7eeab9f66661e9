//! Read-only auditing of job logs and the working directory
//!
//! A job succeeded when its log ends with the lines `SUCCESS` and `0`. The line before those
//! carries the job's runtime in seconds as `runtime: <n>`. Nothing here changes job state; the only
//! file written is the CSV snapshot of a completion check.

/// Classify a single job log
pub mod logfile;

/// Summary statistics over job runtimes
pub mod runtime;

/// Completion checks and their CSV snapshot
pub mod check;

/// Find prepared submissions and show log files
pub mod listing;
