// src/events/mod.rs

//! Typed events published while a job runs.
//!
//! Protocol events come from the decoded stdout of the job process
//! ([`crate::protocol`]); `ProcessStarted`, `ProcessDone` and exit
//! classification errors are produced by the supervisor itself.
//!
//! - [`bus`] holds the publish/subscribe registry.
//! - [`dispatch`] queues events from the runner and delivers them to the bus
//!   on a dedicated thread.
//! - [`log`] provides a subscriber that mirrors every event into `tracing`.

use std::fmt;
use std::path::PathBuf;

use crate::exec::ExitClass;

pub mod bus;
pub mod dispatch;
pub mod log;

pub use bus::{EventBus, Subscribe, SubscriptionId};
pub use dispatch::EventDispatcher;
pub use log::LogSubscriber;

/// One observable step of a job run.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The job process was spawned; always the first event of a run.
    ProcessStarted,
    /// Overall progress in percent.
    TotalProgress(f64),
    /// Progress of the current processing step in percent.
    StepProgress(f64),
    /// A processing step began (payload as reported, e.g. `"0"`).
    StepStarted(String),
    StepCompleted(String),
    AllCompleted,
    /// A result image was written; path already rewritten into the scratch
    /// output directory.
    ImageSaved(PathBuf),
    Error(ErrorDetail),
    /// The job announced the exit code it is about to crash with. `None`
    /// when the announced value was not an integer.
    PossibleError(Option<i32>),
    /// The job reached a terminal state; always the last event of a run.
    ProcessDone(JobOutcome),
}

impl Event {
    /// Short stable name, used as a log field.
    pub fn name(&self) -> &'static str {
        match self {
            Event::ProcessStarted => "process_started",
            Event::TotalProgress(_) => "total_progress",
            Event::StepProgress(_) => "step_progress",
            Event::StepStarted(_) => "step_started",
            Event::StepCompleted(_) => "step_completed",
            Event::AllCompleted => "all_completed",
            Event::ImageSaved(_) => "image_saved",
            Event::Error(_) => "error",
            Event::PossibleError(_) => "possible_error",
            Event::ProcessDone(_) => "process_done",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error(_))
    }
}

/// Where an [`Event::Error`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDetail {
    /// The job itself printed an `*error:` line.
    Reported(String),
    /// No process could be started.
    Spawn(String),
    /// The process exited with a non-zero, non-suppressed exit code.
    Exit(ExitClass),
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDetail::Reported(msg) => write!(f, "{msg}"),
            ErrorDetail::Spawn(msg) => write!(f, "could not start the job: {msg}"),
            ErrorDetail::Exit(class) => write!(f, "{}", class.describe()),
        }
    }
}

/// Terminal result of a run, carried by [`Event::ProcessDone`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Failed(ExitClass),
    /// Terminated through `kill`; the exit code was not classified.
    Cancelled,
}
