use std::fs;

use log::{debug, info};

use crate::db::table::JobTable;
use crate::error::{PrepError, Result};
use crate::paths::Directories;
use crate::params::Resolver;
use crate::report::Reporter;
use crate::spec::JobSpec;
use crate::template;

/// Render every per-job script the job specification declares for `ids`
///
/// Per-job scripts can be regenerated at will, so existing files are replaced. Returns the number
/// of scripts written (or previewed, with `dry_run`).
pub fn generate(
    spec: &JobSpec,
    dirs: &Directories,
    table: &JobTable,
    ids: &[u32],
    dry_run: bool,
    reporter: &dyn Reporter,
) -> Result<usize> {
    let rows = table.select(ids)?;
    let resolver = Resolver::new(spec, dirs);
    let templates = spec.job_templates();
    let mut written = 0;

    for (id, row) in ids.iter().zip(rows) {
        let params = resolver.resolve(row)?;
        debug!(
            "Parameters for job {id}: {}",
            serde_json::to_string(&params).unwrap_or_default()
        );

        for (kind, script_template) in &templates {
            let content = template::render(script_template, &params)?;
            let path = dirs.job_script(*id, *kind);
            match dry_run {
                true => reporter.preview(&path, &content),
                false => {
                    fs::write(&path, &content).map_err(|err| PrepError::io(&path, err))?;
                    debug!("Wrote {}", path.display());
                }
            }
            written += 1;
        }
    }

    info!("Generated {written} scripts for {} jobs", ids.len());
    reporter.line(&format!("Generated {written} job scripts for {} jobs", ids.len()));
    Ok(written)
}
