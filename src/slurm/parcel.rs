//! Packing jobs into array parcels under a wall time ceiling
//!
//! Each parcel runs its jobs serially, so a parcel of `k` jobs needs `ramp_up + k * job_time`,
//! which must stay within `max_job_time`. The parcel count is picked among the divisors of the
//! job count so every parcel gets the same number of jobs; a parallelization target chooses
//! between the fewest, largest parcels (0) and one job per parcel (100).

use log::{info, warn};

use crate::error::{PrepError, Result};
use crate::report::Reporter;
use crate::slurm::walltime;
use crate::spec::JobSpec;

/// Array indices start here, so element scripts sort and read as three digits
pub const ARRAY_INDEX_BASE: u32 = 100;

/// One contiguous slice of the job list, run as one array element
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobParcel {
    pub index: u32,
    pub job_ids: Vec<u32>,
}

/// How to choose the parcel count
#[derive(Copy, Clone, Debug, Default)]
pub struct ParcelOptions {
    /// Use exactly this many parcels
    pub n_parcels: Option<usize>,
    /// Percentile (0-100) of the qualifying parcel counts to pick
    pub parallelization: u8,
}

/// Fewest parcels that keep every parcel within `max_job_time`
///
/// Each parcel pays the ramp-up once, so jobs are packed into `max_job_time - job_ramp_up_time`.
pub fn min_parcels(n_jobs: usize, spec: &JobSpec) -> Result<usize> {
    if n_jobs == 0 {
        return Err(PrepError::EmptyJobList);
    }

    let job_secs = spec.job_time.num_seconds();
    let ramp_secs = spec.job_ramp_up_time.num_seconds();
    let max_secs = spec.max_job_time.num_seconds();
    let budget = max_secs - ramp_secs;

    if budget < job_secs {
        return Err(PrepError::InfeasibleParcellation {
            n_jobs,
            per_parcel_secs: job_secs + ramp_secs,
            max_secs,
        });
    }
    if job_secs == 0 {
        return Ok(1);
    }

    let total = n_jobs as i64 * job_secs;
    let p_min = (total + budget - 1) / budget;
    Ok(p_min.max(1) as usize)
}

/// Every divisor of `n`, ascending
pub fn divisors(n: usize) -> Vec<usize> {
    let mut low = Vec::new();
    let mut high = Vec::new();
    let mut i = 1;
    while i * i <= n {
        if n % i == 0 {
            low.push(i);
            if i * i != n {
                high.push(n / i);
            }
        }
        i += 1;
    }
    low.extend(high.into_iter().rev());
    low
}

/// Nearest-rank percentile of an ascending, non-empty slice
pub fn nearest_rank<T: Copy>(sorted: &[T], percentile: u8) -> Option<T> {
    if sorted.is_empty() {
        return None;
    }
    let percentile = usize::from(percentile.min(100));
    let rank = (percentile * sorted.len() + 99) / 100;
    Some(sorted[rank.max(1) - 1])
}

/// Decide how many parcels `n_jobs` jobs are split into
pub fn parcel_count(
    n_jobs: usize,
    spec: &JobSpec,
    options: &ParcelOptions,
    reporter: &dyn Reporter,
) -> Result<usize> {
    if n_jobs == 0 {
        return Err(PrepError::EmptyJobList);
    }

    if let Some(requested) = options.n_parcels {
        if requested == 0 || requested > n_jobs {
            return Err(PrepError::InvalidParcelCount { requested, n_jobs });
        }
        let longest = (n_jobs + requested - 1) / requested;
        let needed = walltime::estimate(longest, spec);
        if needed > spec.max_job_time {
            warn!("Requested {requested} parcels need {} each", walltime::format(needed));
            reporter.warning(&format!(
                "{requested} parcels of up to {longest} jobs need {}, more than the maximum job time {}",
                walltime::format(needed),
                walltime::format(spec.max_job_time)
            ));
        }
        return Ok(requested);
    }

    let p_min = min_parcels(n_jobs, spec)?;
    let qualifying: Vec<usize> = divisors(n_jobs).into_iter().filter(|d| *d >= p_min).collect();
    info!("At least {p_min} parcels needed, qualifying parcel counts: {qualifying:?}");

    if qualifying == [n_jobs] {
        if n_jobs > 1 && options.parallelization < 100 {
            let message = format!(
                "{n_jobs} jobs can't be split evenly into fewer parcels within the maximum job \
                 time; every job gets its own parcel"
            );
            warn!("{message}");
            reporter.warning(&message);
        }
        return Ok(n_jobs);
    }

    // qualifying always holds n_jobs itself, so it is never empty
    Ok(nearest_rank(&qualifying, options.parallelization).unwrap_or(n_jobs))
}

/// Split `items` into `parts` contiguous chunks whose lengths differ by at most one
///
/// Longer chunks come first. Concatenating the chunks gives back `items` unchanged.
pub fn split_list<T: Clone>(items: &[T], parts: usize) -> Vec<Vec<T>> {
    if parts == 0 {
        return Vec::new();
    }
    let base = items.len() / parts;
    let extra = items.len() % parts;

    let mut chunks = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let len = base + usize::from(i < extra);
        chunks.push(items[start..start + len].to_vec());
        start += len;
    }
    chunks
}

/// Partition the job list into indexed parcels
pub fn parcellate(
    job_ids: &[u32],
    spec: &JobSpec,
    options: &ParcelOptions,
    reporter: &dyn Reporter,
) -> Result<Vec<JobParcel>> {
    let n_parcels = parcel_count(job_ids.len(), spec, options, reporter)?;
    let parcels: Vec<JobParcel> = split_list(job_ids, n_parcels)
        .into_iter()
        .zip(ARRAY_INDEX_BASE..)
        .map(|(job_ids, index)| JobParcel { index, job_ids })
        .collect();
    info!("Job array is {parcels:?}");
    Ok(parcels)
}
