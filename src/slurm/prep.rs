use std::path::PathBuf;

use log::info;

use crate::db::submission::{SubmissionKind, SubmissionRecord};
use crate::error::{PrepError, Result};
use crate::paths::{submission_name, Directories};
use crate::report::Reporter;
use crate::slurm::parcel::{self, ParcelOptions};
use crate::slurm::script::{Resources, ScriptContext, SubmissionUnit};
use crate::spec::JobSpec;

/// Settings shared by standalone and array preparation
#[derive(Clone, Debug)]
pub struct PrepOptions {
    pub sbatch_id: u32,
    pub resources: Resources,
    /// Standalone scripts only: leave out the scheduler header
    pub no_header: bool,
    /// Array scripts only
    pub parcels: ParcelOptions,
    pub dry_run: bool,
}

/// Build one script running `job_ids` serially
pub fn prep_standalone(
    spec: &JobSpec,
    dirs: &Directories,
    job_ids: &[u32],
    options: &PrepOptions,
    reporter: &dyn Reporter,
) -> Result<SubmissionRecord> {
    if job_ids.is_empty() {
        return Err(PrepError::EmptyJobList);
    }

    let unit = SubmissionUnit::Standalone {
        sbatch_id: options.sbatch_id,
        job_ids: job_ids.to_vec(),
        with_header: !options.no_header,
    };
    let ctx = ScriptContext { spec, dirs, resources: &options.resources };
    let rendered = vec![(unit.clone(), unit.render(&ctx)?)];
    let path = write_all(dirs, &rendered, options.dry_run, reporter)?;

    reporter.line(&format!("Prepared {} jobs in {}", job_ids.len(), unit.name()));
    if !options.no_header {
        reporter.line(&format!("Submit with: sbatch {}", path.display()));
    }

    Ok(SubmissionRecord::new(
        options.sbatch_id,
        SubmissionKind::Standalone,
        job_ids.to_vec(),
        1,
        path,
    ))
}

/// Parcellate `job_ids` and build one element script per parcel plus the outer array script
pub fn prep_array(
    spec: &JobSpec,
    dirs: &Directories,
    job_ids: &[u32],
    options: &PrepOptions,
    reporter: &dyn Reporter,
) -> Result<SubmissionRecord> {
    let parcels = parcel::parcellate(job_ids, spec, &options.parcels, reporter)?;
    let n_parcels = parcels.len();
    let ctx = ScriptContext { spec, dirs, resources: &options.resources };

    // everything is rendered before anything is written
    let mut rendered = Vec::with_capacity(n_parcels + 1);
    for parcel in &parcels {
        let element = SubmissionUnit::ArrayElement { sbatch_id: options.sbatch_id, parcel: parcel.clone() };
        let script = element.render(&ctx)?;
        rendered.push((element, script));
    }
    let array = SubmissionUnit::Array { sbatch_id: options.sbatch_id, parcels };
    let script = array.render(&ctx)?;
    rendered.push((array.clone(), script));

    let path = write_all(dirs, &rendered, options.dry_run, reporter)?;

    reporter.line(&format!(
        "Prepared {} jobs in {n_parcels} parcels for array {}",
        job_ids.len(),
        array.name()
    ));
    reporter.line(&format!("Submit with: sbatch {}", path.display()));

    Ok(SubmissionRecord::new(
        options.sbatch_id,
        SubmissionKind::Array,
        job_ids.to_vec(),
        n_parcels,
        path,
    ))
}

/// Fail when submission `sbatch_id` already has a script on disk
///
/// Both shapes write `sb-NNNN.sh`, so checking it is enough to run before any helper script.
pub fn ensure_sbatch_id_unused(dirs: &Directories, sbatch_id: u32) -> Result<()> {
    let path = dirs.slurm_scripts.join(format!("{}.sh", submission_name(sbatch_id)));
    if path.exists() {
        return Err(PrepError::DuplicateSubmissionId { sbatch_id, path });
    }
    Ok(())
}

/// Write (or preview) every rendered unit, returning the path of the last one
///
/// No target may exist yet, so a reused sbatch id fails before a single file is touched.
fn write_all(
    dirs: &Directories,
    rendered: &[(SubmissionUnit, String)],
    dry_run: bool,
    reporter: &dyn Reporter,
) -> Result<PathBuf> {
    for (unit, _) in rendered {
        unit.ensure_unused(dirs)?;
    }

    let mut last = None;
    for (unit, content) in rendered {
        let path = match dry_run {
            true => {
                let path = unit.target_path(dirs);
                reporter.preview(&path, content);
                path
            }
            false => unit.write(dirs, content)?,
        };
        last = Some(path);
    }

    let last = last.ok_or(PrepError::EmptyJobList)?;
    info!("Submission script is {}", last.display());
    Ok(last)
}
