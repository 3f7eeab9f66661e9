use std::path::Path;
use std::process::Command;

use log::info;

use crate::error::{PrepError, Result};

/// Submit a script with `sbatch --parsable`, returning the slurm job id
pub fn run_sbatch(script: &Path) -> Result<String> {
    let mut sbatch = Command::new("sbatch");
    let cmd = sbatch.arg("--parsable").arg(script);
    info!("Running sbatch process");
    info!("{:?}", &cmd);

    let stdout = run(cmd, "sbatch")?;
    parse_job_id(&stdout).ok_or_else(|| PrepError::Helper {
        program: "sbatch".to_string(),
        status: format!("no job id in output {stdout:?}"),
    })
}

/// Queue entries for a user, as printed by `squeue`
pub fn squeue(user: &str) -> Result<String> {
    let mut squeue = Command::new("squeue");
    let cmd = squeue.arg("-u").arg(user);
    info!("{:?}", &cmd);
    run(cmd, "squeue")
}

fn run(cmd: &mut Command, program: &str) -> Result<String> {
    let output = cmd.output().map_err(|err| PrepError::io(program, err))?;
    if !output.status.success() {
        return Err(PrepError::Helper {
            program: program.to_string(),
            status: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `--parsable` prints `jobid` or `jobid;cluster`
fn parse_job_id(stdout: &str) -> Option<String> {
    let id = stdout.trim().split(';').next()?.trim();
    match id.is_empty() {
        true => None,
        false => Some(id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsable_output() {
        assert_eq!(parse_job_id("123456\n").as_deref(), Some("123456"));
        assert_eq!(parse_job_id("123456;midway2\n").as_deref(), Some("123456"));
        assert_eq!(parse_job_id("\n"), None);
    }
}
