use chrono::Duration;
use log::warn;

use crate::audit::logfile::{self, JobStatus};
use crate::error::Result;
use crate::paths::Directories;
use crate::report::Reporter;
use crate::slurm::parcel::nearest_rank;
use crate::slurm::walltime;

pub const PERCENTILES: [u8; 5] = [25, 50, 75, 90, 95];

/// Runtime summary in seconds
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub percentiles: Vec<(u8, f64)>,
    pub max: f64,
}

pub fn summarize(runtimes: &[f64]) -> Option<RuntimeStats> {
    let mut sorted = runtimes.to_vec();
    sorted.sort_by(f64::total_cmp);
    let (min, max) = (*sorted.first()?, *sorted.last()?);

    let percentiles = PERCENTILES
        .iter()
        .filter_map(|p| nearest_rank(&sorted, *p).map(|value| (*p, value)))
        .collect();
    Some(RuntimeStats {
        count: sorted.len(),
        mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
        min,
        percentiles,
        max,
    })
}

/// Seconds as `[D-]HH:MM:SS`
pub fn format_seconds(seconds: f64) -> String {
    walltime::format(Duration::seconds(seconds.round() as i64))
}

/// Collect runtimes from the logs of `ids` and report their summary
pub fn runtime_check(
    dirs: &Directories,
    ids: &[u32],
    reporter: &dyn Reporter,
) -> Result<Option<RuntimeStats>> {
    let mut runtimes = Vec::new();
    let (mut no_log, mut failed, mut unreadable) = (0, 0, 0);

    for id in ids {
        let audit = logfile::audit_log(&dirs.job_log(*id))?;
        match (audit.status, audit.runtime) {
            (JobStatus::Succeeded, Some(runtime)) => runtimes.push(runtime),
            (JobStatus::Succeeded, None) => unreadable += 1,
            (JobStatus::NoLog, _) => no_log += 1,
            (JobStatus::Failed(_), _) => failed += 1,
        }
    }

    for (count, what) in [
        (no_log, "have no log file"),
        (failed, "did not finish successfully"),
        (unreadable, "have no runtime line"),
    ] {
        if count > 0 {
            warn!("{count} jobs {what}");
            reporter.warning(&format!("{count} of {} jobs {what}", ids.len()));
        }
    }

    let stats = summarize(&runtimes);
    match &stats {
        Some(stats) => {
            reporter.line(&format!("Runtime of {} successful jobs:", stats.count));
            reporter.line(&format!("  mean  {}", format_seconds(stats.mean)));
            reporter.line(&format!("  min   {}", format_seconds(stats.min)));
            for (p, value) in &stats.percentiles {
                reporter.line(&format!("  p{p:<4} {}", format_seconds(*value)));
            }
            reporter.line(&format!("  max   {}", format_seconds(stats.max)));
        }
        None => reporter.line("No successful jobs with a recorded runtime"),
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::report::testing::RecordingReporter;

    #[test]
    fn nearest_rank_summary() {
        let runtimes: Vec<f64> = (1..=20).rev().map(|s| f64::from(s) * 10.0).collect();
        let stats = summarize(&runtimes).unwrap();
        assert_eq!(stats.count, 20);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 200.0);
        assert_eq!(stats.mean, 105.0);
        assert_eq!(
            stats.percentiles,
            vec![(25, 50.0), (50, 100.0), (75, 150.0), (90, 180.0), (95, 190.0)]
        );
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn runtime_check_skips_unfinished_jobs() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dirs = Directories::new(tmp.path(), "working");
        dirs.initialize().unwrap();
        fs::write(dirs.job_log(1), "go\nruntime: 60\nSUCCESS\n0\n").unwrap();
        fs::write(dirs.job_log(2), "go\nruntime: 3700\nSUCCESS\n0\n").unwrap();
        fs::write(dirs.job_log(3), "go\nERROR\n1\n").unwrap();
        let reporter = RecordingReporter::default();

        let stats = runtime_check(&dirs, &[1, 2, 3, 4], &reporter).unwrap().unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(format_seconds(stats.max), "01:01:40");
        assert_eq!(reporter.warnings.borrow().len(), 2);
    }
}
