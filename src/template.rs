//! Strict `${name}` substitution for user supplied script templates
//!
//! Only the braced form is a placeholder. A bare `$NAME` is left alone so templates can keep using
//! shell variables, and `$$` renders a literal `$` (write `$${HOME}` to keep a braced shell
//! variable). Every placeholder must have a value: a script with a hole in it is never produced.

use std::collections::BTreeSet;

use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::error::{PrepError, Result};
use crate::params::Params;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:(?P<escaped>\$)|\{(?P<name>[_A-Za-z][_A-Za-z0-9]*)\})")
        .expect("placeholder pattern")
});

/// Distinct placeholder names referenced by a template
pub fn placeholders(template: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.name("name"))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// The subset of `params` a template needs, or every name it needs that isn't there
pub fn required_params(template: &str, params: &Params) -> Result<Params> {
    let fields = placeholders(template);
    let missing: Vec<String> = fields
        .iter()
        .filter(|field| !params.contains_key(*field))
        .cloned()
        .collect();

    if !missing.is_empty() {
        return Err(PrepError::MissingTemplateParameter(missing));
    }

    debug!(
        "Template requires {} of {} available parameters: {}",
        fields.len(),
        params.len(),
        fields.iter().cloned().collect::<Vec<_>>().join(" ")
    );

    Ok(params
        .iter()
        .filter(|(key, _)| fields.contains(*key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect())
}

/// Fill every placeholder in `template`, failing if any of them has no value
pub fn render(template: &str, params: &Params) -> Result<String> {
    let values = required_params(template, params)?;
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        if caps.name("escaped").is_some() {
            return "$".to_string();
        }
        // required_params guarantees every name is present
        values
            .get(&caps["name"])
            .map(value_text)
            .unwrap_or_default()
    });
    Ok(rendered.into_owned())
}

/// Text inserted into a script for a parameter value
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
