//! `eplus-worker` library crate.
//!
//! Re-exports the dispatch loop and its collaborators for integration
//! testing. The binary entrypoint lives in `main.rs`.

pub mod dispatch;
pub mod launcher;
pub mod logging;
pub mod runner;
