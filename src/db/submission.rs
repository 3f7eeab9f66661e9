use std::fmt;
use std::path::PathBuf;

use chrono::Utc;
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{PrepError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SubmissionKind {
    Standalone,
    Array,
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubmissionKind::Standalone => write!(f, "standalone"),
            SubmissionKind::Array => write!(f, "array"),
        }
    }
}

/// A prepared submission, as remembered by the registry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub sbatch_id: u32,
    pub kind: SubmissionKind,
    pub job_ids: Vec<u32>,
    pub n_parcels: usize,
    pub script_path: PathBuf,
    pub created_at: String,
    pub slurm_id: Option<String>,
}

impl SubmissionRecord {
    pub fn new(
        sbatch_id: u32,
        kind: SubmissionKind,
        job_ids: Vec<u32>,
        n_parcels: usize,
        script_path: PathBuf,
    ) -> SubmissionRecord {
        SubmissionRecord {
            sbatch_id,
            kind,
            job_ids,
            n_parcels,
            script_path,
            created_at: Utc::now().to_rfc3339(),
            slurm_id: None,
        }
    }

    fn from_row(row: &Row) -> rusqlite::Result<SubmissionRecord> {
        let kind: String = row.get(1)?;
        let job_ids: String = row.get(2)?;
        let script_path: String = row.get(4)?;
        Ok(SubmissionRecord {
            sbatch_id: row.get(0)?,
            kind: if kind == "array" { SubmissionKind::Array } else { SubmissionKind::Standalone },
            job_ids: job_ids.split_whitespace().filter_map(|id| id.parse().ok()).collect(),
            n_parcels: row.get(3)?,
            script_path: PathBuf::from(script_path),
            created_at: row.get(5)?,
            slurm_id: row.get(6)?,
        })
    }
}

/// Remember a prepared submission; each sbatch id can only be recorded once
pub fn record(conn: &Connection, submission: &SubmissionRecord) -> Result<()> {
    if let Some(existing) = find(conn, submission.sbatch_id)? {
        return Err(PrepError::DuplicateSubmissionId {
            sbatch_id: submission.sbatch_id,
            path: existing.script_path,
        });
    }

    info!("Recording {} submission {:04}", submission.kind, submission.sbatch_id);
    let job_ids: Vec<String> = submission.job_ids.iter().map(u32::to_string).collect();
    conn.execute(
        "INSERT INTO submission (sbatch_id, kind, job_ids, n_parcels, script_path, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            submission.sbatch_id,
            submission.kind.to_string(),
            job_ids.join(" "),
            submission.n_parcels,
            submission.script_path.display().to_string(),
            submission.created_at,
        ],
    )?;
    Ok(())
}

pub fn find(conn: &Connection, sbatch_id: u32) -> Result<Option<SubmissionRecord>> {
    let record = conn
        .query_row(
            "SELECT sbatch_id, kind, job_ids, n_parcels, script_path, created_at, slurm_id \
             FROM submission WHERE sbatch_id = ?1",
            [sbatch_id],
            SubmissionRecord::from_row,
        )
        .optional()?;
    Ok(record)
}

pub fn all(conn: &Connection) -> Result<Vec<SubmissionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT sbatch_id, kind, job_ids, n_parcels, script_path, created_at, slurm_id \
         FROM submission ORDER BY sbatch_id",
    )?;
    let rows = stmt.query_map([], SubmissionRecord::from_row)?;
    let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn set_slurm_id(conn: &Connection, sbatch_id: u32, slurm_id: &str) -> Result<()> {
    info!("Updating submission {sbatch_id:04} with slurm ID {slurm_id}");
    conn.execute(
        "UPDATE submission SET slurm_id = ?1 WHERE sbatch_id = ?2",
        params![slurm_id, sbatch_id],
    )?;
    Ok(())
}
