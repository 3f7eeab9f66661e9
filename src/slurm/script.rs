use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Duration;
use log::info;
use serde::Serialize;
use serde_json::Value;
use tinytemplate::TinyTemplate;

use crate::error::{PrepError, Result};
use crate::params::Params;
use crate::paths::{array_element_name, submission_name, Directories, ScriptKind};
use crate::slurm::parcel::{JobParcel, ARRAY_INDEX_BASE};
use crate::slurm::walltime;
use crate::spec::JobSpec;
use crate::template;

/// Environment variable sbatch substitutes with the running array index
const ARRAY_TASK_ID: &str = "$SLURM_ARRAY_TASK_ID";

/// First line of scripts that run without a scheduler header
const PLAIN_SHEBANG: &str = "#!/bin/bash -e";

/// Scheduler resources requested for a submission
#[derive(Clone, Debug)]
pub struct Resources {
    /// Overrides the estimated wall time
    pub wall_time: Option<Duration>,
    pub n_tasks: u32,
    /// Memory in megabytes
    pub memory_mb: u32,
    /// Maximum number of array elements running at once
    pub rate_limit: Option<u32>,
}

impl Default for Resources {
    fn default() -> Self {
        Resources { wall_time: None, n_tasks: 8, memory_mb: 16_000, rate_limit: None }
    }
}

/// Everything a submission needs to render itself
pub struct ScriptContext<'a> {
    pub spec: &'a JobSpec,
    pub dirs: &'a Directories,
    pub resources: &'a Resources,
}

/// One script handed to (or wrapped for) the scheduler
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionUnit {
    /// Jobs run serially in one submission. Without a header the script can only be run by hand
    /// or wrapped by something else.
    Standalone { sbatch_id: u32, job_ids: Vec<u32>, with_header: bool },
    /// The serial script behind one array index
    ArrayElement { sbatch_id: u32, parcel: JobParcel },
    /// The outer script carrying the array directive
    Array { sbatch_id: u32, parcels: Vec<JobParcel> },
}

/// Rendering context for a serial script
#[derive(Serialize)]
struct SerialContext {
    header: String,
    calls: Vec<JobCall>,
}

#[derive(Serialize)]
struct JobCall {
    script: String,
    log: String,
}

/// Rendering context for an outer array script
#[derive(Serialize)]
struct ArrayContext {
    header: String,
    footer: String,
}

impl SubmissionUnit {
    pub fn sbatch_id(&self) -> u32 {
        match self {
            SubmissionUnit::Standalone { sbatch_id, .. }
            | SubmissionUnit::ArrayElement { sbatch_id, .. }
            | SubmissionUnit::Array { sbatch_id, .. } => *sbatch_id,
        }
    }

    pub fn name(&self) -> String {
        match self {
            SubmissionUnit::ArrayElement { sbatch_id, parcel } => {
                array_element_name(*sbatch_id, parcel.index)
            }
            other => submission_name(other.sbatch_id()),
        }
    }

    pub fn target_path(&self, dirs: &Directories) -> PathBuf {
        dirs.slurm_scripts.join(format!("{}.sh", self.name()))
    }

    pub fn render(&self, ctx: &ScriptContext) -> Result<String> {
        match self {
            SubmissionUnit::Standalone { job_ids, with_header: true, .. } => {
                let time = ctx
                    .resources
                    .wall_time
                    .unwrap_or_else(|| walltime::estimate(job_ids.len(), ctx.spec));
                let log_path = ctx.dirs.slurm_logs.join(format!("{}.txt", self.name()));
                let header = render_header(ctx, &self.name(), &log_path, time, "")?;
                render_serial(ctx, format!("{header}\n{}", ctx.spec.preamble), job_ids)
            }
            SubmissionUnit::Standalone { job_ids, with_header: false, .. } => {
                render_serial(ctx, plain_header(ctx), job_ids)
            }
            SubmissionUnit::ArrayElement { parcel, .. } => {
                render_serial(ctx, plain_header(ctx), &parcel.job_ids)
            }
            SubmissionUnit::Array { sbatch_id, parcels } => render_array(ctx, *sbatch_id, parcels),
        }
    }

    /// Write the rendered script, refusing to replace a script that already exists
    pub fn write(&self, dirs: &Directories, content: &str) -> Result<PathBuf> {
        let path = self.target_path(dirs);
        self.ensure_unused(dirs)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| match err.kind() {
                io::ErrorKind::AlreadyExists => PrepError::DuplicateSubmissionId {
                    sbatch_id: self.sbatch_id(),
                    path: path.clone(),
                },
                _ => PrepError::io(&path, err),
            })?;
        file.write_all(content.as_bytes()).map_err(|err| PrepError::io(&path, err))?;
        info!("Wrote file: {}", path.display());
        Ok(path)
    }

    /// Fail if a script for this submission is already on disk
    pub fn ensure_unused(&self, dirs: &Directories) -> Result<()> {
        let path = self.target_path(dirs);
        if path.exists() {
            return Err(PrepError::DuplicateSubmissionId { sbatch_id: self.sbatch_id(), path });
        }
        Ok(())
    }
}

fn plain_header(ctx: &ScriptContext) -> String {
    format!("{PLAIN_SHEBANG}\n{}", ctx.spec.preamble)
}

fn render_header(
    ctx: &ScriptContext,
    job_name: &str,
    log_path: &Path,
    time: Duration,
    job_array: &str,
) -> Result<String> {
    let values: Params = [
        ("job_name", Value::String(job_name.to_string())),
        ("log_path", Value::String(log_path.display().to_string())),
        ("time", Value::String(walltime::format(time))),
        ("n_tasks", Value::from(ctx.resources.n_tasks)),
        ("mem", Value::from(ctx.resources.memory_mb)),
        ("job_array", Value::String(job_array.to_string())),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    template::render(&ctx.spec.header, &values)
}

fn render_serial(ctx: &ScriptContext, header: String, job_ids: &[u32]) -> Result<String> {
    /// included serial script template
    static SERIAL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/serial.txt"));
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("serial", SERIAL)?;

    let calls = job_ids
        .iter()
        .map(|id| JobCall {
            script: ctx.dirs.job_script(*id, ScriptKind::Run).display().to_string(),
            log: ctx.dirs.job_log(*id).display().to_string(),
        })
        .collect();
    Ok(tt.render("serial", &SerialContext { header, calls })?)
}

fn render_array(ctx: &ScriptContext, sbatch_id: u32, parcels: &[JobParcel]) -> Result<String> {
    /// included array script template
    static ARRAY: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/array.txt"));

    let footer_template = ctx.spec.array_footer.as_deref().ok_or_else(|| {
        PrepError::configuration("array_footer is required to prepare array submissions")
    })?;
    if !template::placeholders(&ctx.spec.header).contains("job_array") {
        return Err(PrepError::configuration(
            "header must reference ${job_array} to prepare array submissions",
        ));
    }

    let name = submission_name(sbatch_id);
    let longest = parcels.iter().map(|p| p.job_ids.len()).max().unwrap_or(0);
    let time = ctx
        .resources
        .wall_time
        .unwrap_or_else(|| walltime::estimate(longest, ctx.spec));
    let log_path = ctx.dirs.slurm_logs.join(format!("{name}-%a.txt"));
    let rate = ctx
        .resources
        .rate_limit
        .map(|limit| format!("%{limit}"))
        .unwrap_or_default();
    let directive = format!(
        "#SBATCH --array={}-{}{rate}",
        ARRAY_INDEX_BASE,
        ARRAY_INDEX_BASE as usize + parcels.len().saturating_sub(1)
    );
    let header = render_header(ctx, &name, &log_path, time, &directive)?;

    let path_to_array = ctx.dirs.slurm_scripts.join(format!("{name}-{ARRAY_TASK_ID}.sh"));
    let footer_values: Params =
        [("path_to_array".to_string(), Value::String(path_to_array.display().to_string()))]
            .into_iter()
            .collect();
    let footer = template::render(footer_template, &footer_values)?;

    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("array", ARRAY)?;
    Ok(tt.render("array", &ArrayContext { header, footer })?)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::spec::testing::minimal_spec;

    fn dirs() -> Directories {
        Directories::new(Path::new("/scratch/me"), "working")
    }

    #[test]
    fn standalone_with_header() {
        let spec = minimal_spec();
        let dirs = dirs();
        let resources = Resources::default();
        let ctx = ScriptContext { spec: &spec, dirs: &dirs, resources: &resources };
        let unit = SubmissionUnit::Standalone { sbatch_id: 7, job_ids: vec![2, 1], with_header: true };

        assert_eq!(unit.target_path(&dirs), Path::new("/scratch/me/working/scripts/slurm/sb-0007.sh"));
        let script = unit.render(&ctx).unwrap();
        assert!(script.starts_with("#!/bin/bash\n#SBATCH --job-name=sb-0007\n"));
        assert!(script.contains("#SBATCH --output=/scratch/me/working/logs/slurm/sb-0007.txt"));
        assert!(script.contains("#SBATCH --time=00:20:00"));
        assert!(script.contains("#SBATCH --ntasks=8"));
        assert!(script.contains("#SBATCH --mem=16000"));
        assert!(script.contains("module load python"));

        let calls: Vec<&str> = script.lines().filter(|l| l.starts_with("bash ")).collect();
        assert_eq!(
            calls,
            vec![
                "bash /scratch/me/working/scripts/jobs/00002_run.sh 2>&1 | tee /scratch/me/working/logs/jobs/00002.txt",
                "bash /scratch/me/working/scripts/jobs/00001_run.sh 2>&1 | tee /scratch/me/working/logs/jobs/00001.txt",
            ]
        );
        let tail: Vec<&str> = script.lines().rev().filter(|l| !l.is_empty()).take(2).collect();
        assert_eq!(tail, vec!["exit", r#"echo "~~~~~~~~~~~~~ END SLURM JOB ~~~~~~~~~~~~~~""#]);
    }

    #[test]
    fn wall_time_override() {
        let spec = minimal_spec();
        let dirs = dirs();
        let resources = Resources { wall_time: Some(Duration::hours(30)), ..Resources::default() };
        let ctx = ScriptContext { spec: &spec, dirs: &dirs, resources: &resources };
        let unit = SubmissionUnit::Standalone { sbatch_id: 1, job_ids: vec![1], with_header: true };
        assert!(unit.render(&ctx).unwrap().contains("#SBATCH --time=1-06:00:00"));
    }

    #[test]
    fn headerless_and_array_element() {
        let spec = minimal_spec();
        let dirs = dirs();
        let resources = Resources::default();
        let ctx = ScriptContext { spec: &spec, dirs: &dirs, resources: &resources };

        let unit = SubmissionUnit::Standalone { sbatch_id: 1, job_ids: vec![1], with_header: false };
        let script = unit.render(&ctx).unwrap();
        assert!(script.starts_with("#!/bin/bash -e\nmodule load python"));
        assert!(!script.contains("#SBATCH"));

        let element = SubmissionUnit::ArrayElement {
            sbatch_id: 3,
            parcel: JobParcel { index: 101, job_ids: vec![4, 5] },
        };
        assert_eq!(element.name(), "sb-0003-101");
        let script = element.render(&ctx).unwrap();
        assert!(!script.contains("#SBATCH"));
        assert_eq!(script.lines().filter(|l| l.starts_with("bash ")).count(), 2);
    }

    #[test]
    fn array_directive_and_footer() {
        let spec = minimal_spec();
        let dirs = dirs();
        let resources = Resources { rate_limit: Some(4), ..Resources::default() };
        let ctx = ScriptContext { spec: &spec, dirs: &dirs, resources: &resources };
        let parcels = vec![
            JobParcel { index: 100, job_ids: vec![1, 2, 3] },
            JobParcel { index: 101, job_ids: vec![4, 5] },
            JobParcel { index: 102, job_ids: vec![6, 7] },
        ];
        let unit = SubmissionUnit::Array { sbatch_id: 12, parcels };
        let script = unit.render(&ctx).unwrap();

        assert!(script.contains("#SBATCH --array=100-102%4"));
        assert!(script.contains("#SBATCH --output=/scratch/me/working/logs/slurm/sb-0012-%a.txt"));
        assert!(script.contains("#SBATCH --time=00:30:00"));
        assert!(script.contains(
            "bash /scratch/me/working/scripts/slurm/sb-0012-$SLURM_ARRAY_TASK_ID.sh"
        ));
    }

    #[test]
    fn array_requires_footer() {
        let mut spec = minimal_spec();
        spec.array_footer = None;
        let dirs = dirs();
        let resources = Resources::default();
        let ctx = ScriptContext { spec: &spec, dirs: &dirs, resources: &resources };
        let unit = SubmissionUnit::Array {
            sbatch_id: 1,
            parcels: vec![JobParcel { index: 100, job_ids: vec![1] }],
        };
        assert!(matches!(unit.render(&ctx), Err(PrepError::Configuration(_))));
    }

    #[test]
    fn header_missing_placeholder_fails() {
        let mut spec = minimal_spec();
        spec.header = "#SBATCH --partition=${partition}".to_string();
        let dirs = dirs();
        let resources = Resources::default();
        let ctx = ScriptContext { spec: &spec, dirs: &dirs, resources: &resources };
        let unit = SubmissionUnit::Standalone { sbatch_id: 1, job_ids: vec![1], with_header: true };
        match unit.render(&ctx) {
            Err(PrepError::MissingTemplateParameter(missing)) => assert_eq!(missing, vec!["partition"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn write_once() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dirs = Directories::new(tmp.path(), "working");
        dirs.initialize().unwrap();
        let unit = SubmissionUnit::Standalone { sbatch_id: 7, job_ids: vec![1], with_header: true };

        unit.write(&dirs, "first").unwrap();
        assert!(matches!(
            unit.write(&dirs, "second"),
            Err(PrepError::DuplicateSubmissionId { sbatch_id: 7, .. })
        ));
        assert_eq!(std::fs::read_to_string(unit.target_path(&dirs)).unwrap(), "first");
    }
}
