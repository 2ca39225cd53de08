// src/events/log.rs

//! Subscriber that mirrors job events into `tracing`.

use tracing::{debug, error, info, warn};

use super::{Event, JobOutcome, Subscribe};

/// Logs every event: progress at `debug`, milestones at `info`, errors at
/// `error`.
#[derive(Debug, Default, Clone)]
pub struct LogSubscriber;

impl Subscribe for LogSubscriber {
    fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        match event {
            Event::ProcessStarted => info!("job process started"),
            Event::TotalProgress(pct) => debug!(progress = pct, "total progress"),
            Event::StepProgress(pct) => debug!(progress = pct, "step progress"),
            Event::StepStarted(step) => info!(step = %step, "step started"),
            Event::StepCompleted(step) => info!(step = %step, "step completed"),
            Event::AllCompleted => info!("all steps completed"),
            Event::ImageSaved(path) => info!(path = %path.display(), "result image saved"),
            Event::Error(detail) => error!(error = %detail, "job error"),
            Event::PossibleError(code) => {
                warn!(code = ?code, "job announced a possible crash")
            }
            Event::ProcessDone(JobOutcome::Success) => info!("job finished successfully"),
            Event::ProcessDone(outcome) => warn!(?outcome, "job finished without success"),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
