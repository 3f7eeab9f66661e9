use jsonschema::JSONSchema;
use log::{info, warn};
use serde_json::Value;

use crate::error::{PrepError, Result};

/// JSON schema every job specification is validated against, bundled at compile time
static SPEC_SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/schema/spec.json"));

/// Validate an untyped specification document, collecting every problem rather than the first
pub fn validate(document: &Value) -> Result<()> {
    info!("Validating job specification against JSON schema");
    let schema: Value = serde_json::from_str(SPEC_SCHEMA)
        .map_err(|err| PrepError::configuration(format!("bundled schema is not JSON: {err}")))?;
    let compiled = JSONSchema::compile(&schema)
        .map_err(|err| PrepError::configuration(format!("bundled schema is invalid: {err}")))?;

    let problems: Vec<String> = match compiled.validate(document) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|err| {
                let location = err.instance_path.to_string();
                if location.is_empty() {
                    err.to_string()
                } else {
                    format!("{location}: {err}")
                }
            })
            .collect(),
    };

    if problems.is_empty() {
        Ok(())
    } else {
        warn!("Job specification fails validation with {} problem(s)", problems.len());
        Err(PrepError::Configuration(problems))
    }
}
