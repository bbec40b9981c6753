//! `eplus-core` -- job-domain logic for the EnergyPlus worker.
//!
//! Everything here is independent of how jobs are scheduled: finding
//! packages, unpacking them, locating inputs, invoking EnergyPlus and
//! telling finished jobs from running ones. The dispatch loop lives in
//! `eplus-worker`.

pub mod archive;
pub mod config;
pub mod error;
pub mod intake;
pub mod job;
pub mod liveness;
pub mod simulation;
