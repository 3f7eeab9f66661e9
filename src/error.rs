use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Every fatal condition raised while preparing a batch of jobs
///
/// None of these are retried. The command layer prints the message and exits non-zero; anything
/// written to disk before the failure stays where it is.
#[derive(Debug, Error)]
pub enum PrepError {
    #[error("invalid job specification: {}", .0.join("; "))]
    Configuration(Vec<String>),

    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("template references parameters that were not provided: {}", .0.join(", "))]
    MissingTemplateParameter(Vec<String>),

    #[error(
        "cannot parcellate {n_jobs} jobs: one job plus ramp-up ({per_parcel_secs}s) already \
         exceeds the maximum job time ({max_secs}s)"
    )]
    InfeasibleParcellation {
        n_jobs: usize,
        per_parcel_secs: i64,
        max_secs: i64,
    },

    #[error("no jobs were selected")]
    EmptyJobList,

    #[error("invalid number of parcels {requested} for {n_jobs} jobs")]
    InvalidParcelCount { requested: usize, n_jobs: usize },

    #[error(
        "sbatch id {sbatch_id:04} has already been used (found {}), choose a different id",
        .path.display()
    )]
    DuplicateSubmissionId { sbatch_id: u32, path: PathBuf },

    #[error("job ids not present in the database: {}", format_ids(.0))]
    DataIntegrity(Vec<u32>),

    #[error("{} failed: {status}", .program)]
    Helper { program: String, status: String },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't render template: {0}")]
    Template(#[from] tinytemplate::error::Error),

    #[error("can't read job database: {0}")]
    Csv(#[from] csv::Error),

    #[error("submission registry: {0}")]
    Registry(#[from] rusqlite::Error),
}

impl PrepError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PrepError::Io { path: path.into(), source }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        PrepError::Configuration(vec![message.into()])
    }
}

fn format_ids(ids: &[u32]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

pub type Result<T> = std::result::Result<T, PrepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parameters_are_all_named() {
        let err = PrepError::MissingTemplateParameter(vec!["a".into(), "b".into()]);
        assert_eq!(
            err.to_string(),
            "template references parameters that were not provided: a, b"
        );
    }

    #[test]
    fn data_integrity_names_offending_ids() {
        let err = PrepError::DataIntegrity(vec![4, 9]);
        assert!(err.to_string().ends_with("4, 9"));
    }
}
