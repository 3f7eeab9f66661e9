use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use log::{info, warn};
use serde_json::{Number, Value};

use crate::error::{PrepError, Result};
use crate::params::{self, Params};

/// The job database: one row per job, keyed by its unique `order_id`
#[derive(Debug, Clone)]
pub struct JobTable {
    columns: Vec<String>,
    rows: BTreeMap<u32, Params>,
}

impl JobTable {
    pub fn read(path: &Path) -> Result<JobTable> {
        info!("Reading job database {}", path.display());
        let file = fs::File::open(path).map_err(|err| PrepError::io(path, err))?;
        JobTable::from_reader(file)
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<JobTable> {
        let mut csv = csv::Reader::from_reader(reader);
        let columns: Vec<String> = csv.headers()?.iter().map(|h| h.trim().to_string()).collect();

        if !columns.iter().any(|c| c == "order_id") {
            return Err(PrepError::configuration(
                "the job database must include an order_id column with job indices",
            ));
        }

        let mut rows = BTreeMap::new();
        let mut duplicates = BTreeSet::new();
        for record in csv.records() {
            let record = record?;
            let row: Params = columns
                .iter()
                .cloned()
                .zip(record.iter().map(infer_cell))
                .collect();
            let id = params::order_id(&row)?;
            if rows.insert(id, row).is_some() {
                duplicates.insert(id);
            }
        }

        if !duplicates.is_empty() {
            return Err(PrepError::configuration(format!(
                "order_id values must be unique, duplicated: {}",
                duplicates.iter().map(u32::to_string).collect::<Vec<_>>().join(", ")
            )));
        }
        if rows.is_empty() {
            warn!("Job database has no rows");
        }

        Ok(JobTable { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Every order_id in the database, ascending
    pub fn ids(&self) -> Vec<u32> {
        self.rows.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Rows for the requested ids, in request order, failing on ids the database doesn't have
    pub fn select(&self, ids: &[u32]) -> Result<Vec<&Params>> {
        self.check_ids(ids)?;
        Ok(ids.iter().filter_map(|id| self.rows.get(id)).collect())
    }

    pub fn check_ids(&self, ids: &[u32]) -> Result<()> {
        let unknown: BTreeSet<u32> = ids
            .iter()
            .filter(|id| !self.rows.contains_key(id))
            .copied()
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(PrepError::DataIntegrity(unknown.into_iter().collect()))
        }
    }
}

/// Validate a database file, then copy it into the working directory
pub fn install(source: &Path, target: &Path) -> Result<JobTable> {
    let table = JobTable::read(source)?;
    info!("Job database has {} jobs with columns {}", table.len(), table.columns().join(", "));
    info!("Copying {} to {}", source.display(), target.display());
    fs::copy(source, target).map_err(|err| PrepError::io(target, err))?;
    Ok(table)
}

/// Integers and floats become numbers, everything else stays text
fn infer_cell(cell: &str) -> Value {
    let trimmed = cell.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Some(float) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(float);
    }
    Value::String(cell.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reads_typed_rows() {
        let table = JobTable::from_reader("order_id,sub,scale\n2,A01,0.5\n1,B02,1\n".as_bytes()).unwrap();
        assert_eq!(table.ids(), vec![1, 2]);
        assert_eq!(table.columns(), &["order_id", "sub", "scale"]);
        let row = table.select(&[2]).unwrap()[0];
        assert_eq!(row["sub"], json!("A01"));
        assert_eq!(row["scale"], json!(0.5));
        assert_eq!(row["order_id"], json!(2));
    }

    #[test]
    fn requires_order_id() {
        assert!(matches!(
            JobTable::from_reader("id,sub\n1,A\n".as_bytes()),
            Err(PrepError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_duplicate_ids() {
        match JobTable::from_reader("order_id\n1\n2\n1\n".as_bytes()) {
            Err(PrepError::Configuration(problems)) => assert!(problems[0].ends_with("1")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn select_reports_every_unknown_id() {
        let table = JobTable::from_reader("order_id\n1\n2\n3\n".as_bytes()).unwrap();
        assert_eq!(table.select(&[3, 1]).unwrap().len(), 2);
        match table.select(&[1, 9, 4]) {
            Err(PrepError::DataIntegrity(ids)) => assert_eq!(ids, vec![4, 9]),
            other => panic!("unexpected {other:?}"),
        }
    }
}
