use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;

/// HPC clusters with a known scratch layout
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Cluster {
    /// UChicago Midway2, user scratch partition
    Midway2Scratch,
    /// Rutgers Amarel, user scratch partition
    Amarel,
}

impl Cluster {
    /// Directory the working tree is created in for `userid`
    pub fn scratch_root(&self, userid: &str) -> PathBuf {
        match self {
            Cluster::Midway2Scratch => PathBuf::from("/home").join(userid).join("scratch-midway2"),
            Cluster::Amarel => PathBuf::from("/scratch").join(userid),
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cluster::Midway2Scratch => write!(f, "midway2-scratch"),
            Cluster::Amarel => write!(f, "amarel"),
        }
    }
}
