//! Per-job parameter resolution
//!
//! A job's parameters are its database row, the global settings (the row wins when both
//! define a key), a set of derived paths, and whatever the enrichment hook adds. Resolution
//! is a pure function of its inputs: resolving the same row twice gives the same parameters.

use std::collections::BTreeMap;
use std::path::PathBuf;

use log::debug;
use serde_json::Value;

use crate::error::{PrepError, Result};
use crate::paths::{job_id, Directories, ScriptKind};
use crate::spec::JobSpec;
use crate::template;

/// Statically registered and external enrichment hooks
pub mod hook;

/// Parameter name to value, for one job
pub type Params = BTreeMap<String, Value>;

/// Read the integer `order_id` out of a row
pub fn order_id(row: &Params) -> Result<u32> {
    let value = row
        .get("order_id")
        .ok_or_else(|| PrepError::configuration("job record has no order_id column"))?;
    value
        .as_u64()
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| {
            PrepError::configuration(format!("order_id must be a non-negative integer, got {value}"))
        })
}

pub struct Resolver<'a> {
    spec: &'a JobSpec,
    dirs: &'a Directories,
}

impl<'a> Resolver<'a> {
    pub fn new(spec: &'a JobSpec, dirs: &'a Directories) -> Resolver<'a> {
        Resolver { spec, dirs }
    }

    /// Compute the full parameter mapping for one database row
    pub fn resolve(&self, row: &Params) -> Result<Params> {
        let id = order_id(row)?;

        let mut params = self.spec.global_settings.clone();
        params.extend(row.iter().map(|(k, v)| (k.clone(), v.clone())));

        self.add_derived(id, &mut params)?;

        match &self.spec.enrichment {
            Some(hook) => hook.apply(&params, self.dirs),
            None => Ok(params),
        }
    }

    fn add_derived(&self, id: u32, params: &mut Params) -> Result<()> {
        let dirs = self.dirs;
        insert(params, "job_id", job_id(id));
        for kind in ScriptKind::ALL {
            insert_path(
                params,
                &format!("this_job_{}_script", kind.as_str()),
                dirs.job_script(id, kind),
            );
        }
        insert_path(params, "this_job_log_file", dirs.job_log(id));
        insert_path(params, "this_job_inputs_dir", dirs.job_input_dir(id));
        insert_path(params, "this_job_work_dir", dirs.job_work_dir(id));

        insert(params, "output_base_dir", self.spec.output_path.clone());
        if let Some(subject) = &self.spec.output_path_subject {
            let mut output_dir = PathBuf::from(&self.spec.output_path);
            for component in subject {
                output_dir.push(template::render(component, params)?);
            }

            if let Some(expr) = &self.spec.output_path_subject_expr {
                let expr = template::render(expr, params)?;
                insert_path(params, "this_job_output_expr_fullpath", output_dir.join(&expr));
                insert(params, "this_job_output_expr", expr);
            }
            insert_path(params, "this_job_output_dir", output_dir);
        }

        debug!("Job {id} has {} parameters after derivation", params.len());
        Ok(())
    }
}

fn insert(params: &mut Params, key: &str, value: String) {
    params.insert(key.to_string(), Value::String(value));
}

fn insert_path(params: &mut Params, key: &str, path: PathBuf) {
    insert(params, key, path.display().to_string());
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;

    use super::*;
    use crate::spec::testing::{minimal_spec, MINIMAL_SPEC};

    fn row(value: Value) -> Params {
        serde_json::from_value(value).unwrap()
    }

    fn dirs() -> Directories {
        Directories::new(Path::new("/scratch/me"), "working")
    }

    #[test]
    fn derived_fields() {
        let spec = minimal_spec();
        let dirs = dirs();
        let params = Resolver::new(&spec, &dirs).resolve(&row(json!({"order_id": 7}))).unwrap();

        assert_eq!(params["job_id"], json!("00007"));
        assert_eq!(
            params["this_job_run_script"],
            json!("/scratch/me/working/scripts/jobs/00007_run.sh")
        );
        assert_eq!(
            params["this_job_clean_script"],
            json!("/scratch/me/working/scripts/jobs/00007_clean.sh")
        );
        assert_eq!(params["this_job_log_file"], json!("/scratch/me/working/logs/jobs/00007.txt"));
        assert_eq!(params["this_job_inputs_dir"], json!("/scratch/me/working/inputs/00007"));
        assert_eq!(params["this_job_work_dir"], json!("/scratch/me/working/work/00007"));
        assert_eq!(params["output_base_dir"], json!("/out"));
        assert!(!params.contains_key("this_job_output_dir"));
    }

    #[test]
    fn job_paths_are_absolute_for_a_relative_root() {
        let spec = minimal_spec();
        let dirs = Directories::locate(Path::new("scratch"), "working").unwrap();
        let params = Resolver::new(&spec, &dirs).resolve(&row(json!({"order_id": 1}))).unwrap();
        for key in [
            "this_job_run_script",
            "this_job_copy_script",
            "this_job_clean_script",
            "this_job_log_file",
            "this_job_inputs_dir",
            "this_job_work_dir",
        ] {
            let value = params[key].as_str().unwrap();
            assert!(Path::new(value).is_absolute(), "{key} is {value}");
        }
    }

    #[test]
    fn row_wins_over_global_settings() {
        let yaml = format!("{MINIMAL_SPEC}script_global_settings: {{threads: 4, env: base}}\n");
        let spec = JobSpec::from_yaml(&yaml).unwrap();
        let dirs = dirs();
        let params = Resolver::new(&spec, &dirs)
            .resolve(&row(json!({"order_id": 1, "threads": 16})))
            .unwrap();
        assert_eq!(params["threads"], json!(16));
        assert_eq!(params["env"], json!("base"));
    }

    #[test]
    fn output_paths_are_resolved() {
        let yaml = format!(
            "{MINIMAL_SPEC}output_path_subject: ['sub-${{sub}}', 'ses-${{ses}}']\n\
             output_path_subject_expr: '*_run-${{run}}_*.nii.gz'\n"
        );
        let spec = JobSpec::from_yaml(&yaml).unwrap();
        let dirs = dirs();
        let params = Resolver::new(&spec, &dirs)
            .resolve(&row(json!({"order_id": 1, "sub": "A01", "ses": 2, "run": 1})))
            .unwrap();
        assert_eq!(params["this_job_output_dir"], json!("/out/sub-A01/ses-2"));
        assert_eq!(params["this_job_output_expr"], json!("*_run-1_*.nii.gz"));
        assert_eq!(
            params["this_job_output_expr_fullpath"],
            json!("/out/sub-A01/ses-2/*_run-1_*.nii.gz")
        );
    }

    #[test]
    fn output_subject_missing_field_fails() {
        let yaml = format!("{MINIMAL_SPEC}output_path_subject: ['sub-${{sub}}']\n");
        let spec = JobSpec::from_yaml(&yaml).unwrap();
        let dirs = dirs();
        assert!(matches!(
            Resolver::new(&spec, &dirs).resolve(&row(json!({"order_id": 1}))),
            Err(PrepError::MissingTemplateParameter(_))
        ));
    }

    #[test]
    fn missing_order_id_is_a_configuration_error() {
        let spec = minimal_spec();
        let dirs = dirs();
        assert!(matches!(
            Resolver::new(&spec, &dirs).resolve(&row(json!({"sub": "A"}))),
            Err(PrepError::Configuration(_))
        ));
    }

    #[test]
    fn resolution_is_pure() {
        let yaml = format!("{MINIMAL_SPEC}compute_function: derivatives_inputs\n");
        let spec = JobSpec::from_yaml(&yaml).unwrap();
        let dirs = dirs();
        let resolver = Resolver::new(&spec, &dirs);
        let input = row(json!({"order_id": 3, "sub": "B"}));
        let first = resolver.resolve(&input).unwrap();
        let second = resolver.resolve(&input).unwrap();
        assert_eq!(first, second);
        assert!(first.contains_key("run_inputs"));
    }
}
