//! Job specifications: the YAML document describing how to turn database rows into scripts
//!
//! Loading is a single explicit pass: YAML is parsed into an untyped document, checked against a
//! bundled JSON schema (all problems are reported together), then deserialised into an immutable
//! [JobSpec] with typed durations.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use log::info;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{PrepError, Result};
use crate::params::hook::{self, EnrichmentHook};
use crate::params::Params;
use crate::paths::ScriptKind;
use crate::template;

/// Durations in job specifications
pub mod duration;
/// Validate untyped specification documents with JSON schema
pub mod schema;

use duration::SpecDuration;

#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub version: String,
    /// Scheduler directive block, filled with `job_name`, `log_path`, `time`, `n_tasks`, `mem`
    /// and `job_array`
    pub header: String,
    pub preamble: String,
    /// Body of an outer array script, filled with `path_to_array`
    pub array_footer: Option<String>,
    pub run_script: String,
    pub copy_script: Option<String>,
    pub clean_script: Option<String>,
    pub global_settings: Params,
    pub database: PathBuf,
    pub output_path: String,
    pub output_path_subject: Option<Vec<String>>,
    pub output_path_subject_expr: Option<String>,
    pub base_directory_name: Option<String>,
    pub job_time: Duration,
    pub max_job_time: Duration,
    pub job_ramp_up_time: Duration,
    pub expected_n_files: Option<usize>,
    pub enrichment: Option<EnrichmentHook>,
}

#[derive(Debug, Deserialize)]
struct RawJobSpec {
    spec_name: String,
    spec_version: Value,
    header: String,
    #[serde(default)]
    preamble: String,
    array_footer: Option<String>,
    run_script: String,
    copy_script: Option<String>,
    clean_script: Option<String>,
    #[serde(default)]
    script_global_settings: Params,
    database: PathBuf,
    output_path: String,
    output_path_subject: Option<Vec<String>>,
    output_path_subject_expr: Option<String>,
    base_directory_name: Option<String>,
    job_time: SpecDuration,
    max_job_time: SpecDuration,
    job_ramp_up_time: Option<SpecDuration>,
    expected_n_files: Option<usize>,
    compute_function: Option<String>,
    compute_command: Option<Vec<String>>,
}

impl JobSpec {
    pub fn load(path: &Path) -> Result<JobSpec> {
        info!("Reading job specification {}", path.display());
        let text = fs::read_to_string(path).map_err(|err| PrepError::io(path, err))?;
        JobSpec::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<JobSpec> {
        let document: Value = serde_yaml::from_str(text)
            .map_err(|err| PrepError::configuration(format!("not a valid YAML document: {err}")))?;
        schema::validate(&document)?;

        info!("Deserialising valid specification into typed JobSpec");
        let raw: RawJobSpec = serde_json::from_value(document)
            .map_err(|err| PrepError::configuration(err.to_string()))?;
        JobSpec::try_from(raw)
    }

    /// Templates for the per-job scripts this spec declares
    pub fn job_templates(&self) -> Vec<(ScriptKind, &str)> {
        let mut templates = vec![(ScriptKind::Run, self.run_script.as_str())];
        if let Some(copy) = &self.copy_script {
            templates.push((ScriptKind::Copy, copy.as_str()));
        }
        if let Some(clean) = &self.clean_script {
            templates.push((ScriptKind::Clean, clean.as_str()));
        }
        templates
    }
}

impl TryFrom<RawJobSpec> for JobSpec {
    type Error = PrepError;

    fn try_from(raw: RawJobSpec) -> Result<JobSpec> {
        let mut problems = Vec::new();
        let mut duration = |key: &str, value: &SpecDuration| match value.to_duration() {
            Ok(d) => d,
            Err(message) => {
                problems.push(format!("{key}: {message}"));
                Duration::zero()
            }
        };

        let job_time = duration("job_time", &raw.job_time);
        let max_job_time = duration("max_job_time", &raw.max_job_time);
        let job_ramp_up_time = raw
            .job_ramp_up_time
            .as_ref()
            .map(|value| duration("job_ramp_up_time", value))
            .unwrap_or_else(Duration::zero);

        if max_job_time <= Duration::zero() {
            problems.push("max_job_time: must be longer than zero".to_string());
        }

        let enrichment = match (raw.compute_function, raw.compute_command) {
            (Some(name), _) if !hook::is_registered(&name) => {
                problems.push(format!(
                    "compute_function: unknown function '{name}', available: {}",
                    hook::registered_names().join(", ")
                ));
                None
            }
            (Some(name), _) => Some(EnrichmentHook::Builtin(name)),
            (None, Some(command)) => Some(EnrichmentHook::Command(command)),
            (None, None) => None,
        };

        if !problems.is_empty() {
            return Err(PrepError::Configuration(problems));
        }

        Ok(JobSpec {
            name: raw.spec_name,
            version: template::value_text(&raw.spec_version),
            header: raw.header,
            preamble: raw.preamble,
            array_footer: raw.array_footer,
            run_script: raw.run_script,
            copy_script: raw.copy_script,
            clean_script: raw.clean_script,
            global_settings: raw.script_global_settings,
            database: raw.database,
            output_path: raw.output_path,
            output_path_subject: raw.output_path_subject,
            output_path_subject_expr: raw.output_path_subject_expr,
            base_directory_name: raw.base_directory_name,
            job_time,
            max_job_time,
            job_ramp_up_time,
            expected_n_files: raw.expected_n_files,
            enrichment,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn minimal_spec_loads() {
        let spec = minimal_spec();
        assert_eq!(spec.name, "demo");
        assert_eq!(spec.version, "2022-03-16");
        assert_eq!(spec.job_time, Duration::minutes(10));
        assert_eq!(spec.max_job_time, Duration::hours(1));
        assert_eq!(spec.job_ramp_up_time, Duration::zero());
        assert!(spec.enrichment.is_none());
        assert_eq!(spec.job_templates().len(), 1);
    }

    #[test]
    fn global_settings_and_hooks() {
        let yaml = format!(
            "{MINIMAL_SPEC}script_global_settings: {{conda_env: /envs/a, threads: 4}}\n\
             compute_function: bids_run_id\n\
             job_ramp_up_time: '00:05:00'\n"
        );
        let spec = JobSpec::from_yaml(&yaml).unwrap();
        assert_eq!(spec.global_settings["threads"], serde_json::json!(4));
        assert_eq!(spec.enrichment, Some(EnrichmentHook::Builtin("bids_run_id".into())));
        assert_eq!(spec.job_ramp_up_time, Duration::minutes(5));
    }

    #[test]
    fn unknown_hook_is_a_configuration_error() {
        let yaml = format!("{MINIMAL_SPEC}compute_function: nope\n");
        assert!(matches!(JobSpec::from_yaml(&yaml), Err(PrepError::Configuration(_))));
    }

    #[test]
    fn zero_max_job_time_rejected() {
        let yaml = MINIMAL_SPEC.replace("max_job_time: {hours: 1}", "max_job_time: {hours: 0}");
        assert!(matches!(JobSpec::from_yaml(&yaml), Err(PrepError::Configuration(_))));
    }

    #[test]
    fn unknown_keys_rejected() {
        let yaml = format!("{MINIMAL_SPEC}not_a_key: 1\n");
        match JobSpec::from_yaml(&yaml) {
            Err(PrepError::Configuration(problems)) => {
                assert!(problems.join(" ").contains("not_a_key"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
