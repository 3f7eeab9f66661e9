//! Working directory layout
//!
//! Everything the tool writes lives under one base directory:
//!
//! ```text
//! <base>/
//!   db.csv            copy of the job database
//!   slurmprep.db      submission registry
//!   checks/           completion check snapshots
//!   scripts/slurm/    sb-NNNN.sh and sb-NNNN-III.sh submission scripts
//!   scripts/jobs/     NNNNN_{run,copy,clean}.sh per-job scripts
//!   logs/slurm/       scheduler logs
//!   logs/jobs/        per-job logs
//!   inputs/ work/     per-job input and working directories
//!   crashes/
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{PrepError, Result};

pub const DEFAULT_BASE_DIR_NAME: &str = "working";

/// The three kinds of per-job script
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScriptKind {
    Run,
    Copy,
    Clean,
}

impl ScriptKind {
    pub const ALL: [ScriptKind; 3] = [ScriptKind::Run, ScriptKind::Copy, ScriptKind::Clean];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptKind::Run => "run",
            ScriptKind::Copy => "copy",
            ScriptKind::Clean => "clean",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directories {
    pub base: PathBuf,
    pub checks: PathBuf,
    pub slurm_scripts: PathBuf,
    pub slurm_logs: PathBuf,
    pub job_scripts: PathBuf,
    pub job_logs: PathBuf,
    pub job_inputs: PathBuf,
    pub job_work: PathBuf,
    pub crashes: PathBuf,
}

impl Directories {
    pub fn new(root: &Path, base_dir_name: &str) -> Directories {
        let base = root.join(base_dir_name);
        Directories {
            checks: base.join("checks"),
            slurm_scripts: base.join("scripts").join("slurm"),
            slurm_logs: base.join("logs").join("slurm"),
            job_scripts: base.join("scripts").join("jobs"),
            job_logs: base.join("logs").join("jobs"),
            job_inputs: base.join("inputs"),
            job_work: base.join("work"),
            crashes: base.join("crashes"),
            base,
        }
    }

    /// Like `new`, with a relative `root` taken from the current directory
    ///
    /// Generated scripts embed these paths and run wherever sbatch starts them.
    pub fn locate(root: &Path, base_dir_name: &str) -> Result<Directories> {
        let root = std::path::absolute(root).map_err(|err| PrepError::io(root, err))?;
        Ok(Directories::new(&root, base_dir_name))
    }

    /// Create the directory tree, leaving existing directories alone
    pub fn initialize(&self) -> Result<()> {
        for (name, path) in self.as_map() {
            info!("Creating {name} directory {}", path.display());
            fs::create_dir_all(&path).map_err(|err| PrepError::io(&path, err))?;
        }
        Ok(())
    }

    /// Named paths, as handed to enrichment hooks
    pub fn as_map(&self) -> BTreeMap<&'static str, PathBuf> {
        BTreeMap::from([
            ("base", self.base.clone()),
            ("checks", self.checks.clone()),
            ("slurm_scripts", self.slurm_scripts.clone()),
            ("slurm_logs", self.slurm_logs.clone()),
            ("job_scripts", self.job_scripts.clone()),
            ("job_logs", self.job_logs.clone()),
            ("job_inputs", self.job_inputs.clone()),
            ("job_work", self.job_work.clone()),
            ("crashes", self.crashes.clone()),
        ])
    }

    pub fn database(&self) -> PathBuf {
        self.base.join("db.csv")
    }

    pub fn registry(&self) -> PathBuf {
        self.base.join("slurmprep.db")
    }

    pub fn job_script(&self, order_id: u32, kind: ScriptKind) -> PathBuf {
        self.job_scripts
            .join(format!("{}_{}.sh", job_id(order_id), kind.as_str()))
    }

    pub fn job_log(&self, order_id: u32) -> PathBuf {
        self.job_logs.join(format!("{}.txt", job_id(order_id)))
    }

    pub fn job_input_dir(&self, order_id: u32) -> PathBuf {
        self.job_inputs.join(job_id(order_id))
    }

    pub fn job_work_dir(&self, order_id: u32) -> PathBuf {
        self.job_work.join(job_id(order_id))
    }

    pub fn submission_log(&self, sbatch_id: u32) -> PathBuf {
        self.slurm_logs.join(format!("{}.txt", submission_name(sbatch_id)))
    }
}

/// Zero padded job identifier, e.g. `00042`
pub fn job_id(order_id: u32) -> String {
    format!("{order_id:05}")
}

/// Name of a standalone or outer array submission, e.g. `sb-0007`
pub fn submission_name(sbatch_id: u32) -> String {
    format!("sb-{sbatch_id:04}")
}

/// Name of one element of an array submission, e.g. `sb-0007-100`
pub fn array_element_name(sbatch_id: u32, index: u32) -> String {
    format!("sb-{sbatch_id:04}-{index:03}")
}
