//! Assemble scheduler submissions from per-job scripts

/// Split job lists into array parcels under the maximum job time
pub mod parcel;

/// Standalone, array element and outer array scripts
pub mod script;

/// Prepare submissions: render, check for collisions, write
pub mod prep;

/// Talk to the scheduler's command line tools
pub mod scheduler;

pub mod walltime;
