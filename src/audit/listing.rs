use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PrepError, Result};
use crate::paths::{submission_name, Directories};

/// Submission scripts found in the scripts directory
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Listing {
    /// Names of scripts without array elements
    pub standalone: Vec<String>,
    /// Outer array script name to the number of element scripts
    pub arrays: BTreeMap<String, usize>,
}

/// Scan for `sb-NNNN.sh` scripts, telling arrays apart by their `sb-NNNN-III.sh` elements
pub fn list_submissions(dirs: &Directories) -> Result<Listing> {
    let mut listing = Listing::default();
    for outer in glob_sorted(&dirs.slurm_scripts, "sb-[0-9][0-9][0-9][0-9].sh")? {
        let Some(name) = outer.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let elements = glob_sorted(&dirs.slurm_scripts, &format!("{name}-[0-9][0-9][0-9].sh"))?;
        match elements.len() {
            0 => listing.standalone.push(name),
            n => {
                listing.arrays.insert(name, n);
            }
        }
    }
    Ok(listing)
}

/// Which part of a log to show
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogView {
    Full,
    HeadTail { head: usize, tail: usize },
}

/// Render a log for display, eliding the middle unless the full log is asked for
pub fn show_log(path: &Path, view: LogView) -> Result<String> {
    let content = fs::read_to_string(path).map_err(|err| PrepError::io(path, err))?;
    let (head, tail) = match view {
        LogView::Full => return Ok(content),
        LogView::HeadTail { head, tail } => (head, tail),
    };

    let lines: Vec<&str> = content.lines().collect();
    if head + tail >= lines.len() {
        return Ok(content);
    }
    let skipped = lines.len() - head - tail;
    let mut shown: Vec<String> = lines[..head].iter().map(|l| l.to_string()).collect();
    shown.push(format!("[... {skipped} lines ...]"));
    shown.extend(lines[lines.len() - tail..].iter().map(|l| l.to_string()));
    Ok(shown.join("\n"))
}

/// Scheduler logs of a submission: `sb-NNNN.txt`, or one `sb-NNNN-III.txt` per array element
pub fn submission_logs(dirs: &Directories, sbatch_id: u32) -> Result<Vec<PathBuf>> {
    let standalone = dirs.submission_log(sbatch_id);
    if standalone.is_file() {
        return Ok(vec![standalone]);
    }
    glob_sorted(&dirs.slurm_logs, &format!("{}-*.txt", submission_name(sbatch_id)))
}

fn glob_sorted(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = dir.join(pattern);
    let full = full.to_string_lossy();
    let mut paths: Vec<PathBuf> = glob::glob(&full)
        .map_err(|err| PrepError::configuration(format!("bad pattern {full}: {err}")))?
        .filter_map(|entry| entry.ok())
        .collect();
    paths.sort();
    Ok(paths)
}
