use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::audit::logfile::{self, JobStatus};
use crate::db::table::JobTable;
use crate::error::{PrepError, Result};
use crate::params::{Params, Resolver};
use crate::paths::{job_id, Directories};
use crate::report::Reporter;
use crate::spec::JobSpec;

/// Number of log lines shown for each failed job
const FAILED_LOG_TAIL: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
}

impl CheckResult {
    fn pass(message: impl Into<String>) -> CheckResult {
        CheckResult { passed: true, message: message.into() }
    }

    fn fail(message: impl Into<String>) -> CheckResult {
        CheckResult { passed: false, message: message.into() }
    }
}

/// Every completion check for one job
#[derive(Clone, Debug, PartialEq)]
pub struct JobCheck {
    pub order_id: u32,
    pub status: JobStatus,
    pub runtime: Option<f64>,
    pub log: CheckResult,
    pub inputs_cleared: CheckResult,
    pub work_cleared: CheckResult,
    /// Only checked when an output expression and an expected file count are configured
    pub outputs: Option<CheckResult>,
}

impl JobCheck {
    pub fn valid(&self) -> bool {
        self.log.passed
            && self.inputs_cleared.passed
            && self.work_cleared.passed
            && self.outputs.as_ref().map_or(true, |c| c.passed)
    }
}

/// One line of the CSV snapshot
#[derive(Serialize)]
struct SnapshotRow<'a> {
    order_id: u32,
    status: &'static str,
    runtime_seconds: Option<f64>,
    valid: bool,
    log_check: bool,
    log_message: &'a str,
    inputs_cleared: bool,
    inputs_message: &'a str,
    work_cleared: bool,
    work_message: &'a str,
    outputs_check: Option<bool>,
    outputs_message: &'a str,
}

impl<'a> From<&'a JobCheck> for SnapshotRow<'a> {
    fn from(check: &'a JobCheck) -> Self {
        SnapshotRow {
            order_id: check.order_id,
            status: check.status.label(),
            runtime_seconds: check.runtime,
            valid: check.valid(),
            log_check: check.log.passed,
            log_message: &check.log.message,
            inputs_cleared: check.inputs_cleared.passed,
            inputs_message: &check.inputs_cleared.message,
            work_cleared: check.work_cleared.passed,
            work_message: &check.work_cleared.message,
            outputs_check: check.outputs.as_ref().map(|c| c.passed),
            outputs_message: check.outputs.as_ref().map_or("", |c| c.message.as_str()),
        }
    }
}

/// Check every job in `ids`, report a summary and write the snapshot to the checks directory
pub fn check_completion(
    spec: &JobSpec,
    dirs: &Directories,
    table: &JobTable,
    ids: &[u32],
    show_failed_logs: bool,
    reporter: &dyn Reporter,
) -> Result<(Vec<JobCheck>, PathBuf)> {
    let rows = table.select(ids)?;
    let resolver = Resolver::new(spec, dirs);
    let check_outputs = spec.expected_n_files.is_some() && spec.output_path_subject_expr.is_some();
    if spec.expected_n_files.is_some() && !check_outputs {
        warn!("expected_n_files is set without output_path_subject_expr, outputs are not checked");
    }

    let mut checks = Vec::with_capacity(ids.len());
    for (id, row) in ids.iter().zip(rows) {
        let outputs = match (check_outputs, spec.expected_n_files) {
            (true, Some(expected)) => Some(output_check(&resolver.resolve(row)?, expected)?),
            _ => None,
        };
        checks.push(check_job(dirs, *id, outputs)?);
    }

    summarize(&checks, dirs, show_failed_logs, reporter)?;
    let path = write_snapshot(&checks, dirs)?;
    reporter.line(&format!("Wrote check results to {}", path.display()));
    Ok((checks, path))
}

fn check_job(dirs: &Directories, id: u32, outputs: Option<CheckResult>) -> Result<JobCheck> {
    let audit = logfile::audit_log(&dirs.job_log(id))?;
    let log = match &audit.status {
        JobStatus::Succeeded => CheckResult::pass("job finished successfully"),
        JobStatus::NoLog => CheckResult::fail("no log file"),
        JobStatus::Failed(reason) => CheckResult::fail(reason.clone()),
    };
    Ok(JobCheck {
        order_id: id,
        status: audit.status,
        runtime: audit.runtime,
        log,
        inputs_cleared: cleared(&dirs.job_input_dir(id))?,
        work_cleared: cleared(&dirs.job_work_dir(id))?,
        outputs,
    })
}

/// A job directory counts as cleared when it is gone or empty
fn cleared(dir: &Path) -> Result<CheckResult> {
    match fs::read_dir(dir) {
        Ok(mut entries) => match entries.next() {
            None => Ok(CheckResult::pass("directory is empty")),
            Some(_) => Ok(CheckResult::fail(format!("{} is not empty", dir.display()))),
        },
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Ok(CheckResult::pass("directory does not exist"))
        }
        Err(err) => Err(PrepError::io(dir, err)),
    }
}

fn output_check(params: &Params, expected: usize) -> Result<CheckResult> {
    let pattern = match params.get("this_job_output_expr_fullpath") {
        Some(Value::String(pattern)) => pattern,
        _ => return Ok(CheckResult::fail("no output expression for this job")),
    };
    let matches = glob::glob(pattern)
        .map_err(|err| PrepError::configuration(format!("bad output expression {pattern}: {err}")))?
        .filter_map(|entry| entry.ok())
        .count();
    let message = format!("{matches} of {expected} files matching {pattern}");
    Ok(match matches == expected {
        true => CheckResult::pass(message),
        false => CheckResult::fail(message),
    })
}

fn summarize(
    checks: &[JobCheck],
    dirs: &Directories,
    show_failed_logs: bool,
    reporter: &dyn Reporter,
) -> Result<()> {
    let count = |status: &str| checks.iter().filter(|c| c.status.label() == status).count();
    let valid = checks.iter().filter(|c| c.valid()).count();
    reporter.line(&format!(
        "{} jobs checked: {} succeeded, {} failed, {} without log; {valid} valid",
        checks.len(),
        count("succeeded"),
        count("failed"),
        count("no_log"),
    ));

    for check in checks.iter().filter(|c| !c.valid()) {
        let problems: Vec<&str> = [
            Some(&check.log),
            Some(&check.inputs_cleared),
            Some(&check.work_cleared),
            check.outputs.as_ref(),
        ]
        .into_iter()
        .flatten()
        .filter(|c| !c.passed)
        .map(|c| c.message.as_str())
        .collect();
        reporter.line(&format!("  {}: {}", job_id(check.order_id), problems.join("; ")));

        if show_failed_logs && matches!(check.status, JobStatus::Failed(_)) {
            let path = dirs.job_log(check.order_id);
            let content = fs::read_to_string(&path).map_err(|err| PrepError::io(&path, err))?;
            let lines: Vec<&str> = content.lines().collect();
            let start = lines.len().saturating_sub(FAILED_LOG_TAIL);
            reporter.line(&format!("  --- {} ---", path.display()));
            for line in &lines[start..] {
                reporter.line(&format!("  {line}"));
            }
        }
    }
    Ok(())
}

fn write_snapshot(checks: &[JobCheck], dirs: &Directories) -> Result<PathBuf> {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let path = dirs.checks.join(format!("check_{stamp}.csv"));
    info!("Writing completion snapshot {}", path.display());

    let mut writer = csv::Writer::from_path(&path)?;
    for check in checks {
        writer.serialize(SnapshotRow::from(check))?;
    }
    writer.flush().map_err(|err| PrepError::io(&path, err))?;
    Ok(path)
}
