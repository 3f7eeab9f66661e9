use chrono::Duration;

use crate::spec::JobSpec;

/// Estimated wall time for running `n_jobs` jobs serially in one submission
pub fn estimate(n_jobs: usize, spec: &JobSpec) -> Duration {
    let per_job = spec.job_time.num_seconds();
    Duration::seconds(spec.job_ramp_up_time.num_seconds() + per_job * n_jobs as i64)
}

/// Format a duration the way sbatch expects `--time`: `HH:MM:SS`, or `D-HH:MM:SS` past a day
pub fn format(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    match days {
        0 => format!("{hours:02}:{minutes:02}:{seconds:02}"),
        _ => format!("{days}-{hours:02}:{minutes:02}:{seconds:02}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::testing::minimal_spec;

    #[test]
    fn formats_like_sbatch() {
        assert_eq!(format(Duration::hours(1)), "01:00:00");
        assert_eq!(format(Duration::seconds(3_725)), "01:02:05");
        assert_eq!(format(Duration::hours(49)), "2-01:00:00");
    }

    #[test]
    fn estimate_includes_ramp_up() {
        let mut spec = minimal_spec();
        assert_eq!(estimate(6, &spec), Duration::hours(1));
        spec.job_ramp_up_time = Duration::minutes(5);
        assert_eq!(estimate(2, &spec), Duration::minutes(25));
    }
}
