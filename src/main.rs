use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use log::{info, warn};

use crate::audit::listing::{self, LogView};
use crate::cli::{CheckCmd, Cli, Commands, PrepArgs};
use crate::db::open::{open_db, release_or_rollback};
use crate::db::submission;
use crate::db::table::{self, JobTable};
use crate::error::PrepError;
use crate::jobs::helpers::{self, HelperAction};
use crate::paths::{Directories, DEFAULT_BASE_DIR_NAME};
use crate::report::{ConsoleReporter, Reporter};
use crate::slurm::parcel::ParcelOptions;
use crate::slurm::prep::{self, PrepOptions};
use crate::slurm::scheduler;
use crate::slurm::script::Resources;
use crate::spec::JobSpec;

mod audit;
mod cli;
mod cluster;
mod db;
mod error;
mod jobs;
mod params;
mod paths;
mod report;
mod slurm;
mod spec;
mod template;

#[derive(Copy, Clone, PartialEq, Eq)]
enum SubmissionShape {
    Standalone,
    Array,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(&args);
    info!("slurm-prep starting up");

    let reporter = ConsoleReporter;

    if let Commands::ValidateSpec = args.command {
        return validate_spec(&args, &reporter);
    }

    let spec = JobSpec::load(&args.spec)
        .with_context(|| format!("can't load job specification {}", args.spec.display()))?;
    let dirs = working_directories(&args, &spec)?;
    info!("Working directory is {}", dirs.base.display());

    match &args.command {
        Commands::Init { db, full } => {
            let db = db.as_deref().unwrap_or(spec.database.as_path());
            init(&spec, &dirs, db, *full, args.dry, &reporter)?
        }
        Commands::GenScripts { jobs: selection } => {
            let table = load_table(&dirs)?;
            let ids = selection.resolve(&table)?;
            jobs::scripts::generate(&spec, &dirs, &table, &ids, args.dry, &reporter)?;
        }
        Commands::Prep(prep_args) => {
            prepare(SubmissionShape::Standalone, &spec, &dirs, prep_args, args.dry, &reporter)?
        }
        Commands::PrepArray(prep_args) => {
            prepare(SubmissionShape::Array, &spec, &dirs, prep_args, args.dry, &reporter)?
        }
        Commands::Copy { jobs: selection } | Commands::Clean { jobs: selection } => {
            let action = match matches!(args.command, Commands::Copy { .. }) {
                true => HelperAction::Copy,
                false => HelperAction::Clean,
            };
            let ids = selection.resolve(&load_table(&dirs)?)?;
            helpers::run(action, &spec, &dirs, &ids, args.dry, &reporter)?;
        }
        Commands::Submit { sbatch_id } => submit(&dirs, *sbatch_id, args.dry, &reporter)?,
        Commands::List => list(&dirs, &reporter)?,
        Commands::Check { cmd } => check(&args, &spec, &dirs, cmd, &reporter)?,
        // answered before the job specification is loaded
        Commands::ValidateSpec => {}
    }

    Ok(())
}

/// Default to warnings only; RUST_LOG still wins
fn init_logging(args: &Cli) {
    let level = match (args.debug, args.verbose) {
        (true, _) => "debug",
        (false, true) => "info",
        (false, false) => "warn",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn validate_spec(args: &Cli, reporter: &dyn Reporter) -> anyhow::Result<()> {
    match JobSpec::load(&args.spec) {
        Ok(spec) => {
            reporter.line(&format!(
                "{} is valid: {} version {}",
                args.spec.display(),
                spec.name,
                spec.version
            ));
            Ok(())
        }
        Err(PrepError::Configuration(problems)) => {
            for problem in &problems {
                reporter.line(problem);
            }
            bail!("{} has {} problems", args.spec.display(), problems.len())
        }
        Err(err) => Err(err.into()),
    }
}

fn working_directories(args: &Cli, spec: &JobSpec) -> anyhow::Result<Directories> {
    let root: PathBuf = match (&args.wd_path, args.cluster) {
        (Some(path), _) => path.clone(),
        (None, Some(cluster)) => {
            let userid = match &args.userid {
                Some(userid) => userid.clone(),
                None => env::var("USER").context("--userid not given and $USER is not set")?,
            };
            info!("Using {cluster} scratch space of {userid}");
            cluster.scratch_root(&userid)
        }
        (None, None) => bail!("one of --wd-path or --cluster is required"),
    };

    let base_name = match &spec.base_directory_name {
        Some(name) => name.as_str(),
        None => {
            warn!("base_directory_name is not set, using {DEFAULT_BASE_DIR_NAME}");
            DEFAULT_BASE_DIR_NAME
        }
    };
    Ok(Directories::locate(&root, base_name)?)
}

fn load_table(dirs: &Directories) -> anyhow::Result<JobTable> {
    let path = dirs.database();
    JobTable::read(&path).with_context(|| {
        format!("can't read the job database {}, has init been run?", path.display())
    })
}

fn init(
    spec: &JobSpec,
    dirs: &Directories,
    db: &Path,
    full: bool,
    dry_run: bool,
    reporter: &dyn Reporter,
) -> anyhow::Result<()> {
    if dry_run {
        let table = JobTable::read(db)?;
        reporter.line(&format!(
            "--dry set, would create {} and install {} jobs from {}",
            dirs.base.display(),
            table.len(),
            db.display()
        ));
        return Ok(());
    }

    dirs.initialize()?;
    let table = table::install(db, &dirs.database())?;
    let conn = open_db(dirs).context("can't create the submission registry")?;
    release_or_rollback(&conn, false)?;
    reporter.line(&format!("Initialised {} with {} jobs", dirs.base.display(), table.len()));

    if full {
        jobs::scripts::generate(spec, dirs, &table, &table.ids(), false, reporter)?;
    }
    Ok(())
}

fn prepare(
    shape: SubmissionShape,
    spec: &JobSpec,
    dirs: &Directories,
    args: &PrepArgs,
    dry_run: bool,
    reporter: &dyn Reporter,
) -> anyhow::Result<()> {
    let table = load_table(dirs)?;
    let ids = args.jobs.resolve(&table)?;

    let conn = open_db(dirs)?;
    if let Some(existing) = submission::find(&conn, args.sbatch_id)? {
        return Err(PrepError::DuplicateSubmissionId {
            sbatch_id: args.sbatch_id,
            path: existing.script_path,
        }
        .into());
    }
    prep::ensure_sbatch_id_unused(dirs, args.sbatch_id)?;

    if let Some(action) = args.helper() {
        helpers::run(action, spec, dirs, &ids, dry_run, reporter)?;
    }

    let options = PrepOptions {
        sbatch_id: args.sbatch_id,
        resources: Resources {
            wall_time: args.time,
            n_tasks: args.n_tasks,
            memory_mb: args.memory,
            rate_limit: args.rate_limit,
        },
        no_header: args.no_header,
        parcels: ParcelOptions { n_parcels: args.n_parcels, parallelization: args.parallelization },
        dry_run,
    };
    let record = match shape {
        SubmissionShape::Standalone => prep::prep_standalone(spec, dirs, &ids, &options, reporter)?,
        SubmissionShape::Array => prep::prep_array(spec, dirs, &ids, &options, reporter)?,
    };

    submission::record(&conn, &record)?;
    release_or_rollback(&conn, dry_run)?;
    Ok(())
}

fn submit(
    dirs: &Directories,
    sbatch_id: u32,
    dry_run: bool,
    reporter: &dyn Reporter,
) -> anyhow::Result<()> {
    let conn = open_db(dirs)?;
    let record = submission::find(&conn, sbatch_id)?
        .ok_or_else(|| anyhow!("no prepared submission with sbatch id {sbatch_id:04}"))?;
    if let Some(slurm_id) = &record.slurm_id {
        warn!("Submission {sbatch_id:04} was already submitted as slurm job {slurm_id}");
    }

    if dry_run {
        reporter.line(&format!("--dry set, would run sbatch {}", record.script_path.display()));
    } else {
        let slurm_id = scheduler::run_sbatch(&record.script_path)?;
        submission::set_slurm_id(&conn, sbatch_id, &slurm_id)?;
        reporter.line(&format!("Submitted {} as slurm job {slurm_id}", record.script_path.display()));
    }
    release_or_rollback(&conn, dry_run)?;
    Ok(())
}

fn list(dirs: &Directories, reporter: &dyn Reporter) -> anyhow::Result<()> {
    let found = listing::list_submissions(dirs)?;
    reporter.line(&format!("Standalone submissions: {}", found.standalone.len()));
    for name in &found.standalone {
        reporter.line(&format!("  {name}"));
    }
    reporter.line(&format!("Array submissions: {}", found.arrays.len()));
    for (name, n_elements) in &found.arrays {
        reporter.line(&format!("  {name} ({n_elements} parcels)"));
    }

    let conn = open_db(dirs)?;
    for record in submission::all(&conn)? {
        reporter.line(&format!(
            "sb-{:04} {} {} jobs, {} parcels, prepared {}, slurm job {}",
            record.sbatch_id,
            record.kind,
            record.job_ids.len(),
            record.n_parcels,
            record.created_at,
            record.slurm_id.as_deref().unwrap_or("-")
        ));
    }
    release_or_rollback(&conn, false)?;
    Ok(())
}

fn check(
    args: &Cli,
    spec: &JobSpec,
    dirs: &Directories,
    cmd: &CheckCmd,
    reporter: &dyn Reporter,
) -> anyhow::Result<()> {
    match cmd {
        CheckCmd::Completion { show_failed_logs, jobs } => {
            let table = load_table(dirs)?;
            let ids = jobs.resolve(&table)?;
            audit::check::check_completion(spec, dirs, &table, &ids, *show_failed_logs, reporter)?;
        }
        CheckCmd::Runtime { jobs } => {
            let ids = jobs.resolve(&load_table(dirs)?)?;
            audit::runtime::runtime_check(dirs, &ids, reporter)?;
        }
        CheckCmd::Log(log_args) => {
            let view = match log_args.full {
                true => LogView::Full,
                false => LogView::HeadTail { head: log_args.head, tail: log_args.tail },
            };
            let paths = match (log_args.job_id, log_args.sbatch_id) {
                (Some(job_id), _) => vec![dirs.job_log(job_id)],
                (None, Some(sbatch_id)) => listing::submission_logs(dirs, sbatch_id)?,
                (None, None) => bail!("one of --job-id or --sbatch-id is required"),
            };
            if paths.is_empty() {
                bail!("no logs found");
            }
            for path in paths {
                reporter.line(&format!("--- {} ---", path.display()));
                reporter.line(&listing::show_log(&path, view)?);
            }
        }
        CheckCmd::Queue => {
            let user = match &args.userid {
                Some(userid) => userid.clone(),
                None => env::var("USER").context("--userid not given and $USER is not set")?,
            };
            reporter.line(&scheduler::squeue(&user)?);
        }
    }
    Ok(())
}
