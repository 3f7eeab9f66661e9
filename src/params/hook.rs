//! Enrichment hooks add project specific parameters to a job before its scripts are rendered
//!
//! A hook is either one of the functions registered here by name, or an external command that
//! reads `{"params": .., "dirs": ..}` as JSON on stdin and prints the enriched parameters as a JSON
//! object on stdout. Configuration never carries code. Whatever the hook returns must keep every
//! key it was given.

use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;

use log::{debug, info};
use serde_json::{json, Value};

use crate::error::{PrepError, Result};
use crate::params::Params;
use crate::paths::Directories;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentHook {
    /// A function registered in this module
    Builtin(String),
    /// An external program and its arguments, speaking JSON over stdin/stdout
    Command(Vec<String>),
}

type HookFn = fn(Params, &Directories) -> Result<Params>;

static BUILTINS: &[(&str, HookFn)] = &[
    ("bids_run_id", bids_run_id),
    ("derivatives_inputs", derivatives_inputs),
];

pub fn is_registered(name: &str) -> bool {
    BUILTINS.iter().any(|(registered, _)| *registered == name)
}

pub fn registered_names() -> Vec<&'static str> {
    BUILTINS.iter().map(|(name, _)| *name).collect()
}

impl EnrichmentHook {
    pub fn apply(&self, params: &Params, dirs: &Directories) -> Result<Params> {
        let enriched = match self {
            EnrichmentHook::Builtin(name) => {
                let function = BUILTINS
                    .iter()
                    .find(|(registered, _)| *registered == name.as_str())
                    .map(|(_, function)| *function)
                    .ok_or_else(|| {
                        PrepError::configuration(format!("unknown compute_function '{name}'"))
                    })?;
                debug!("Applying enrichment function {name}");
                function(params.clone(), dirs)?
            }
            EnrichmentHook::Command(argv) => run_command(argv, params, dirs)?,
        };

        let dropped: Vec<&str> = params
            .keys()
            .filter(|key| !enriched.contains_key(*key))
            .map(String::as_str)
            .collect();
        if !dropped.is_empty() {
            return Err(PrepError::ContractViolation(format!(
                "enrichment function dropped required keys: {}",
                dropped.join(", ")
            )));
        }

        Ok(enriched)
    }
}

fn run_command(argv: &[String], params: &Params, dirs: &Directories) -> Result<Params> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| PrepError::configuration("compute_command is empty"))?;

    let dir_map: serde_json::Map<String, Value> = dirs
        .as_map()
        .into_iter()
        .map(|(name, path)| (name.to_string(), Value::String(path.display().to_string())))
        .collect();
    let request = json!({ "params": params, "dirs": dir_map });

    info!("Running enrichment command {}", argv.join(" "));
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|err| PrepError::io(program, err))?;

    // stdin is fed from its own thread so a hook may print before it has read everything
    let stdin = child.stdin.take();
    let payload = request.to_string();
    let (written, output) = thread::scope(|scope| {
        let writer = scope.spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(payload.as_bytes()),
            None => Ok(()),
        });
        let output = child.wait_with_output();
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));
        (written, output)
    });

    let output = output.map_err(|err| PrepError::io(program, err))?;
    if !output.status.success() {
        return Err(PrepError::Helper {
            program: program.clone(),
            status: output.status.to_string(),
        });
    }
    match written {
        Err(err) if err.kind() != io::ErrorKind::BrokenPipe => {
            return Err(PrepError::io(program, err))
        }
        _ => debug!("Enrichment command {program} finished"),
    }

    match serde_json::from_slice::<Value>(&output.stdout) {
        Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(other) => Err(PrepError::ContractViolation(format!(
            "enrichment command {program} must print a JSON object, got {}",
            type_name(&other)
        ))),
        Err(err) => Err(PrepError::ContractViolation(format!(
            "enrichment command {program} printed invalid JSON: {err}"
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Zero padded `run_id` for BIDS style databases with a `run` column
fn bids_run_id(mut params: Params, _dirs: &Directories) -> Result<Params> {
    if let Some(run) = params.get("run").and_then(Value::as_u64) {
        params.insert("run_id".to_string(), Value::String(format!("{run:02}")));
    }
    Ok(params)
}

/// `run_inputs`: the derivatives folder inside the job's working directory
fn derivatives_inputs(mut params: Params, dirs: &Directories) -> Result<Params> {
    let order_id = params
        .get("order_id")
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| PrepError::ContractViolation("order_id is not an integer".to_string()))?;
    let path = dirs.job_work_dir(order_id).join("derivatives");
    params.insert("run_inputs".to_string(), Value::String(path.display().to_string()));
    Ok(params)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn dirs() -> Directories {
        Directories::new(Path::new("/scratch/me"), "working")
    }

    fn params(pairs: Value) -> Params {
        serde_json::from_value(pairs).unwrap()
    }

    fn shell(body: &str) -> EnrichmentHook {
        EnrichmentHook::Command(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("cat > /dev/null; {body}"),
        ])
    }

    #[test]
    fn builtin_adds_keys() {
        let hook = EnrichmentHook::Builtin("bids_run_id".into());
        let out = hook.apply(&params(json!({"order_id": 1, "run": 3})), &dirs()).unwrap();
        assert_eq!(out["run_id"], json!("03"));
        assert_eq!(out["order_id"], json!(1));
    }

    #[test]
    fn derivatives_inputs_points_into_work_dir() {
        let hook = EnrichmentHook::Builtin("derivatives_inputs".into());
        let out = hook.apply(&params(json!({"order_id": 12})), &dirs()).unwrap();
        assert_eq!(out["run_inputs"], json!("/scratch/me/working/work/00012/derivatives"));
    }

    #[cfg(unix)]
    #[test]
    fn command_must_print_an_object() {
        match shell("echo '[1, 2]'").apply(&params(json!({"order_id": 1})), &dirs()) {
            Err(PrepError::ContractViolation(message)) => assert!(message.contains("an array")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn command_dropping_keys_is_a_violation() {
        match shell(r#"echo '{"other": 1}'"#).apply(&params(json!({"order_id": 1})), &dirs()) {
            Err(PrepError::ContractViolation(message)) => {
                assert!(message.contains("dropped required keys: order_id"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn command_enriches() {
        let hook = shell(r#"echo '{"order_id": 1, "extra": "yes"}'"#);
        let out = hook.apply(&params(json!({"order_id": 1})), &dirs()).unwrap();
        assert_eq!(out["extra"], json!("yes"));
    }

    #[cfg(unix)]
    #[test]
    fn command_sees_params_and_dirs() {
        let hook = EnrichmentHook::Command(vec![
            "sh".to_string(),
            "-c".to_string(),
            r#"grep -q '"job_work":"/scratch/me/working/work"' && echo '{"order_id": 1}'"#.to_string(),
        ]);
        assert!(hook.apply(&params(json!({"order_id": 1})), &dirs()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn command_may_print_before_reading_stdin() {
        let hook = EnrichmentHook::Command(vec![
            "sh".to_string(),
            "-c".to_string(),
            r#"head -c 200000 /dev/zero | tr '\0' ' '; cat > /dev/null; echo '{"order_id": 1, "big": "x"}'"#
                .to_string(),
        ]);
        let big = "y".repeat(200_000);
        let out = hook.apply(&params(json!({"order_id": 1, "big": big})), &dirs()).unwrap();
        assert_eq!(out["big"], json!("x"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_a_helper_error() {
        assert!(matches!(
            shell("exit 3").apply(&params(json!({"order_id": 1})), &dirs()),
            Err(PrepError::Helper { .. })
        ));
    }
}
