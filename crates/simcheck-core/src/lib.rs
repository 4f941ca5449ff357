//! Regression verification of simulation logs: namelist lookup, tolerance
//! schedules, two-stream log comparison, verdict checks and timing reports.

pub mod checks;
pub mod comparator;
pub mod domain;
pub mod namelist;
pub mod numerics;
pub mod profiling;
pub mod tolerance;
