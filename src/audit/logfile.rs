use std::fs;
use std::io;
use std::path::Path;

use log::debug;

use crate::error::{PrepError, Result};

pub const SUCCESS_MARKER: &str = "SUCCESS";
pub const EXIT_MARKER: &str = "0";
pub const RUNTIME_PREFIX: &str = "runtime: ";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    NoLog,
    Failed(String),
    Succeeded,
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::NoLog => "no_log",
            JobStatus::Failed(_) => "failed",
            JobStatus::Succeeded => "succeeded",
        }
    }
}

/// Classification of one job log, with the runtime of a successful job
#[derive(Clone, Debug, PartialEq)]
pub struct LogAudit {
    pub status: JobStatus,
    /// Seconds
    pub runtime: Option<f64>,
}

impl LogAudit {
    fn failed(reason: impl Into<String>) -> LogAudit {
        LogAudit { status: JobStatus::Failed(reason.into()), runtime: None }
    }
}

/// Classify log content by its last non-blank lines
///
/// Markers must match exactly, only line endings are stripped.
pub fn classify(content: &str) -> LogAudit {
    let lines: Vec<&str> = content.lines().filter(|line| !line.trim().is_empty()).collect();

    match lines.as_slice() {
        [] => LogAudit::failed("log file is empty"),
        [only] => LogAudit::failed(format!("log file has a single line: {only}")),
        [.., marker, code] if *marker == SUCCESS_MARKER && *code == EXIT_MARKER => LogAudit {
            status: JobStatus::Succeeded,
            runtime: lines.len().checked_sub(3).and_then(|i| parse_runtime(lines[i])),
        },
        [.., last] => LogAudit::failed(format!(
            "log does not end with {SUCCESS_MARKER} and {EXIT_MARKER}, last line: {last}"
        )),
    }
}

/// Classify the log at `path`; a missing file means the job never ran
pub fn audit_log(path: &Path) -> Result<LogAudit> {
    match fs::read(path) {
        Ok(bytes) => Ok(classify(&String::from_utf8_lossy(&bytes))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!("No log at {}", path.display());
            Ok(LogAudit { status: JobStatus::NoLog, runtime: None })
        }
        Err(err) => Err(PrepError::io(path, err)),
    }
}

fn parse_runtime(line: &str) -> Option<f64> {
    let value = line.strip_prefix(RUNTIME_PREFIX)?.trim();
    match value.parse::<f64>() {
        Ok(seconds) if seconds.is_finite() => Some(seconds),
        _ => {
            debug!("Unreadable runtime line {line:?}");
            None
        }
    }
}
