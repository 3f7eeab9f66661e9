use std::fmt;
use std::process::Command;

use log::info;

use crate::error::{PrepError, Result};
use crate::paths::{job_id, Directories, ScriptKind};
use crate::report::Reporter;
use crate::spec::JobSpec;

/// Helper scripts run before a submission is prepared
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HelperAction {
    Copy,
    Clean,
    /// Clean, then copy
    Reset,
}

impl HelperAction {
    fn kinds(&self) -> &'static [ScriptKind] {
        match self {
            HelperAction::Copy => &[ScriptKind::Copy],
            HelperAction::Clean => &[ScriptKind::Clean],
            HelperAction::Reset => &[ScriptKind::Clean, ScriptKind::Copy],
        }
    }
}

impl fmt::Display for HelperAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HelperAction::Copy => write!(f, "copy"),
            HelperAction::Clean => write!(f, "clean"),
            HelperAction::Reset => write!(f, "reset"),
        }
    }
}

/// Run the helper scripts of `action` for each job in turn, stopping at the first failure
pub fn run(
    action: HelperAction,
    spec: &JobSpec,
    dirs: &Directories,
    ids: &[u32],
    dry_run: bool,
    reporter: &dyn Reporter,
) -> Result<()> {
    for kind in action.kinds() {
        let declared = match kind {
            ScriptKind::Copy => spec.copy_script.is_some(),
            ScriptKind::Clean => spec.clean_script.is_some(),
            ScriptKind::Run => true,
        };
        if !declared {
            return Err(PrepError::configuration(format!(
                "{action} needs a {}_script in the job specification",
                kind.as_str()
            )));
        }
    }

    for id in ids {
        for kind in action.kinds() {
            let script = dirs.job_script(*id, *kind);
            if !script.is_file() {
                return Err(PrepError::configuration(format!(
                    "{} script for job {} not found at {}, run gen-scripts first",
                    kind.as_str(),
                    job_id(*id),
                    script.display()
                )));
            }
            if dry_run {
                reporter.line(&format!("--dry set, would run bash {}", script.display()));
                continue;
            }

            info!("Running {}", script.display());
            let status = Command::new("bash")
                .arg(&script)
                .status()
                .map_err(|err| PrepError::io(&script, err))?;
            if !status.success() {
                return Err(PrepError::Helper {
                    program: script.display().to_string(),
                    status: status.to_string(),
                });
            }
        }
    }

    reporter.line(&format!("Ran {action} for {} jobs", ids.len()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::report::testing::RecordingReporter;
    use crate::spec::testing::{minimal_spec, MINIMAL_SPEC};

    fn spec_with_helpers() -> JobSpec {
        let yaml = format!("{MINIMAL_SPEC}copy_script: cp a b\nclean_script: rm b\n");
        JobSpec::from_yaml(&yaml).unwrap()
    }

    fn working() -> (tempfile::TempDir, Directories) {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dirs = Directories::new(tmp.path(), "working");
        dirs.initialize().unwrap();
        (tmp, dirs)
    }

    #[test]
    fn reset_runs_clean_then_copy() {
        let (_tmp, dirs) = working();
        let marker = dirs.base.join("order.txt");
        for id in [1, 2] {
            for kind in [ScriptKind::Clean, ScriptKind::Copy] {
                let line = format!("echo {id}-{} >> {}", kind.as_str(), marker.display());
                fs::write(dirs.job_script(id, kind), line).unwrap();
            }
        }
        let reporter = RecordingReporter::default();

        run(HelperAction::Reset, &spec_with_helpers(), &dirs, &[1, 2], false, &reporter).unwrap();
        assert_eq!(
            fs::read_to_string(marker).unwrap(),
            "1-clean\n1-copy\n2-clean\n2-copy\n"
        );
    }

    #[test]
    fn first_failure_aborts() {
        let (_tmp, dirs) = working();
        let marker = dirs.base.join("ran.txt");
        fs::write(dirs.job_script(1, ScriptKind::Copy), "exit 3").unwrap();
        fs::write(
            dirs.job_script(2, ScriptKind::Copy),
            format!("touch {}", marker.display()),
        )
        .unwrap();
        let reporter = RecordingReporter::default();

        assert!(matches!(
            run(HelperAction::Copy, &spec_with_helpers(), &dirs, &[1, 2], false, &reporter),
            Err(PrepError::Helper { .. })
        ));
        assert!(!marker.exists());
    }

    #[test]
    fn undeclared_helper_is_a_configuration_error() {
        let (_tmp, dirs) = working();
        let reporter = RecordingReporter::default();
        assert!(matches!(
            run(HelperAction::Clean, &minimal_spec(), &dirs, &[1], false, &reporter),
            Err(PrepError::Configuration(_))
        ));
    }

    #[test]
    fn dry_run_only_reports() {
        let (_tmp, dirs) = working();
        fs::write(dirs.job_script(1, ScriptKind::Clean), "exit 1").unwrap();
        let reporter = RecordingReporter::default();
        run(HelperAction::Clean, &spec_with_helpers(), &dirs, &[1], true, &reporter).unwrap();
        assert!(reporter.lines.borrow()[0].starts_with("--dry set, would run bash"));
    }
}
