// src/exec/mod.rs

//! Process execution layer.
//!
//! This module runs job processes with `tokio::process::Command` and reports
//! their progress through the [`EventBus`](crate::events::EventBus).
//!
//! - [`supervisor`] owns the single-job lifecycle (`start` / `kill`).
//! - [`job_runner`] drives one spawned process: stdout decoding and exit.
//! - [`exit_code`] classifies exit codes, including predicted crashes.
//! - [`diagnostics`] keeps the last lines of output for failure reports.

pub mod diagnostics;
pub mod exit_code;
pub mod job_runner;
pub mod supervisor;

pub use diagnostics::{DIAGNOSTIC_CAPACITY, DiagnosticRingBuffer};
pub use exit_code::{ExitClass, effective_exit_code};
pub use supervisor::{JobSupervisor, SupervisorSnapshot};
