use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::Duration;
use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::cluster::Cluster;
use crate::db::table::JobTable;
use crate::error::{PrepError, Result};
use crate::jobs::helpers::HelperAction;
use crate::spec::duration::parse_clock;

/// Prepare batches of SLURM jobs from a job database and a YAML job specification
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("location").args(["wd_path", "cluster"])))]
pub struct Cli {
    /// Path to the YAML job specification
    #[arg(short, long)]
    pub spec: PathBuf,

    /// Directory the working tree lives in
    #[arg(long)]
    pub wd_path: Option<PathBuf>,

    /// Put the working tree in a cluster's scratch space
    #[arg(long, value_enum)]
    pub cluster: Option<Cluster>,

    /// User whose scratch space is used with --cluster, defaults to $USER
    #[arg(long, requires = "cluster")]
    pub userid: Option<String>,

    /// Report what would be written or run without touching anything
    #[arg(long, global = true)]
    pub dry: bool,

    /// Log progress
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log everything, including resolved job parameters
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the working tree, install the job database and the submission registry
    Init {
        /// CSV job database with an order_id column, defaults to the one in the job specification
        #[arg(long)]
        db: Option<PathBuf>,
        /// Also generate every job's scripts
        #[arg(long)]
        full: bool,
    },
    /// Render run, copy and clean scripts for each job
    GenScripts {
        #[command(flatten)]
        jobs: JobSelection,
    },
    /// Prepare one submission running the jobs serially
    Prep(PrepArgs),
    /// Prepare an array submission with the jobs split into parcels
    PrepArray(PrepArgs),
    /// Run each job's copy script
    Copy {
        #[command(flatten)]
        jobs: JobSelection,
    },
    /// Run each job's clean script
    Clean {
        #[command(flatten)]
        jobs: JobSelection,
    },
    /// Submit a prepared submission with sbatch
    Submit {
        #[arg(long)]
        sbatch_id: u32,
    },
    /// List prepared submissions
    List,
    /// Audit jobs and the scheduler queue
    Check {
        #[command(subcommand)]
        cmd: CheckCmd,
    },
    /// Load the job specification and print every problem with it
    ValidateSpec,
}

#[derive(Subcommand, Debug)]
pub enum CheckCmd {
    /// Check logs, leftover directories and outputs, and write a CSV snapshot
    Completion {
        /// Print the end of each failed job's log
        #[arg(long)]
        show_failed_logs: bool,
        #[command(flatten)]
        jobs: JobSelection,
    },
    /// Summarise runtimes of successful jobs
    Runtime {
        #[command(flatten)]
        jobs: JobSelection,
    },
    /// Show a job or submission log
    Log(LogArgs),
    /// Show the user's scheduler queue
    Queue,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["job_id", "sbatch_id"])))]
pub struct LogArgs {
    #[arg(long)]
    pub job_id: Option<u32>,
    #[arg(long)]
    pub sbatch_id: Option<u32>,
    /// Show the whole log
    #[arg(long, conflicts_with_all = ["head", "tail"])]
    pub full: bool,
    #[arg(long, default_value_t = 20)]
    pub head: usize,
    #[arg(long, default_value_t = 20)]
    pub tail: usize,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("helper").args(["do_clean", "do_copy", "do_reset"])))]
pub struct PrepArgs {
    #[command(flatten)]
    pub jobs: JobSelection,

    /// Submission id, used to name scripts and logs; can't be reused
    #[arg(long)]
    pub sbatch_id: u32,

    /// Wall time as [D-]HH:MM:SS, estimated from the job time when not given
    #[arg(long, value_parser = parse_clock)]
    pub time: Option<Duration>,

    #[arg(long, default_value_t = 8)]
    pub n_tasks: u32,

    /// Memory in MB
    #[arg(long, default_value_t = 16_000)]
    pub memory: u32,

    /// Leave out the scheduler header (standalone submissions only)
    #[arg(long)]
    pub no_header: bool,

    /// Use exactly this many parcels (arrays only)
    #[arg(long)]
    pub n_parcels: Option<usize>,

    /// 0 packs jobs into the fewest parcels, 100 gives every job its own (arrays only)
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub parallelization: u8,

    /// Maximum number of array elements running at once
    #[arg(long)]
    pub rate_limit: Option<u32>,

    /// Run each job's clean script first
    #[arg(long)]
    pub do_clean: bool,

    /// Run each job's copy script first
    #[arg(long)]
    pub do_copy: bool,

    /// Run each job's clean then copy script first
    #[arg(long)]
    pub do_reset: bool,
}

impl PrepArgs {
    pub fn helper(&self) -> Option<HelperAction> {
        match (self.do_clean, self.do_copy, self.do_reset) {
            (_, _, true) => Some(HelperAction::Reset),
            (true, _, _) => Some(HelperAction::Clean),
            (_, true, _) => Some(HelperAction::Copy),
            _ => None,
        }
    }
}

/// Which jobs a command applies to; every job in the database when neither option is given
#[derive(Args, Debug, Clone, Default)]
#[group(multiple = false)]
pub struct JobSelection {
    /// Job order ids
    #[arg(long, num_args = 1..)]
    pub ids: Vec<u32>,

    /// Inclusive range of job order ids
    #[arg(long, num_args = 2, value_names = ["LO", "HI"])]
    pub range: Vec<u32>,
}

impl JobSelection {
    /// Selected ids in request order without repeats, all of them present in `table`
    pub fn resolve(&self, table: &JobTable) -> Result<Vec<u32>> {
        let requested: Vec<u32> = match (self.ids.as_slice(), self.range.as_slice()) {
            ([], []) => return Ok(table.ids()),
            (ids, []) => ids.to_vec(),
            (_, [lo, hi]) if lo <= hi => (*lo..=*hi).collect(),
            (_, [lo, hi]) => {
                return Err(PrepError::configuration(format!(
                    "--range {lo} {hi} is empty, the lower bound comes first"
                )))
            }
            (_, other) => {
                return Err(PrepError::configuration(format!(
                    "--range takes two ids, got {}",
                    other.len()
                )))
            }
        };

        let mut seen = BTreeSet::new();
        let ids: Vec<u32> = requested.into_iter().filter(|id| seen.insert(*id)).collect();
        table.check_ids(&ids)?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn table() -> JobTable {
        JobTable::from_reader("order_id\n1\n2\n3\n5\n".as_bytes()).unwrap()
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn selection() {
        let all = JobSelection::default();
        assert_eq!(all.resolve(&table()).unwrap(), vec![1, 2, 3, 5]);

        let ids = JobSelection { ids: vec![3, 1, 3], range: vec![] };
        assert_eq!(ids.resolve(&table()).unwrap(), vec![3, 1]);

        let range = JobSelection { ids: vec![], range: vec![1, 3] };
        assert_eq!(range.resolve(&table()).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn range_is_inclusive_and_checked() {
        let range = JobSelection { ids: vec![], range: vec![2, 6] };
        match range.resolve(&table()) {
            Err(PrepError::DataIntegrity(ids)) => assert_eq!(ids, vec![4, 6]),
            other => panic!("unexpected {other:?}"),
        }
        let backwards = JobSelection { ids: vec![], range: vec![3, 1] };
        assert!(matches!(backwards.resolve(&table()), Err(PrepError::Configuration(_))));
    }

    #[test]
    fn parses_prep_array() {
        let cli = Cli::try_parse_from([
            "slurm-prep", "--spec", "job.yaml", "--wd-path", "/scratch/me", "prep-array",
            "--sbatch-id", "3", "--range", "1", "12", "--time", "02:00:00",
            "--parallelization", "50", "--rate-limit", "4", "--do-reset",
        ])
        .unwrap();
        match cli.command {
            Commands::PrepArray(args) => {
                assert_eq!(args.sbatch_id, 3);
                assert_eq!(args.jobs.range, vec![1, 12]);
                assert_eq!(args.time, Some(Duration::hours(2)));
                assert_eq!(args.parallelization, 50);
                assert_eq!(args.helper(), Some(HelperAction::Reset));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_selection_and_bad_parallelization() {
        let base = ["slurm-prep", "--spec", "job.yaml", "prep-array", "--sbatch-id", "1"];
        let both = [&base[..], &["--ids", "1", "--range", "1", "2"][..]].concat();
        assert!(Cli::try_parse_from(both).is_err());
        let too_parallel = [&base[..], &["--parallelization", "101"][..]].concat();
        assert!(Cli::try_parse_from(too_parallel).is_err());
    }
}
