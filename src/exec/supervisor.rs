// src/exec/supervisor.rs

//! Single-job process supervisor.
//!
//! [`JobSupervisor`] owns the lifecycle of at most one job process at a time:
//!
//! ```text
//! start(spec)
//!   ├─► kill previous job (if any) and wait for its ProcessDone
//!   ├─► runtime_ready?            ── no ──► Error(Spawn), phase Idle
//!   ├─► ledger.create(input/style)
//!   ├─► gateway.launch_command
//!   ├─► spawn process + runner task
//!   └─► return JobId
//!
//! runner task
//!   ├─► queue ProcessStarted
//!   ├─► stdout line ─► ring buffer ─► decode ─► queue       (repeat)
//!   ├─► process exit ─► classify (unless suppressed by kill)
//!   ├─► release scratch files
//!   ├─► queue Error(Exit(..)) on failure, dump ring buffer
//!   └─► queue ProcessDone(outcome)
//! ```
//!
//! Events are queued on an [`EventDispatcher`] and delivered to the bus on
//! its own thread, so neither the runner nor `kill` ever waits for a
//! subscriber.
//!
//! Two locks are involved:
//! - the *lifecycle gate* (async) serializes `start` and `kill`; a `kill`
//!   issued while a `start` is preparing waits for it,
//! - the *state section* (sync, never held across `.await` or while
//!   publishing) guards the current process, the suppression target and the
//!   scratch ledger. `start`, `kill` and the runner's exit handling all go
//!   through it.
//!
//! Exit-code suppression is scoped to the job id that was killed, so a `kill`
//! without an active process cannot affect a later run.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::process::Child;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::errors::{DreamError, Result};
use crate::events::{ErrorDetail, Event, EventBus, EventDispatcher, JobOutcome};
use crate::exec::diagnostics::DiagnosticRingBuffer;
use crate::exec::exit_code::{ExitClass, effective_exit_code};
use crate::exec::job_runner::{RunReport, drive_process};
use crate::fs::{RealFileSystem, ResourceRole, TempResourceLedger};
use crate::gateway::{ContainerRuntimeGateway, DockerGateway, LaunchRequest};
use crate::protocol::ProtocolDecoder;
use crate::types::{JobId, JobPhase, JobSpec};

/// Point-in-time view of the supervisor, mainly for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSnapshot {
    pub phase: JobPhase,
    pub active_job: Option<JobId>,
    /// Job whose next exit classification will be skipped.
    pub suppressed: Option<JobId>,
    pub live_scratch_files: usize,
}

struct ActiveJob {
    id: JobId,
    cancel: Option<oneshot::Sender<()>>,
    runner: Option<JoinHandle<()>>,
}

struct SupervisorState {
    phase: JobPhase,
    current: Option<ActiveJob>,
    /// Runner of a job that already left `current` but may still be
    /// publishing its final events.
    retired: Option<JoinHandle<()>>,
    suppressed: Option<JobId>,
    ledger: TempResourceLedger,
}

struct Inner {
    gateway: Arc<dyn ContainerRuntimeGateway>,
    bus: EventBus,
    events: EventDispatcher,
    decoder: ProtocolDecoder,
    lifecycle: tokio::sync::Mutex<()>,
    state: Mutex<SupervisorState>,
    next_job: AtomicU64,
    /// Id of the most recent job that reached its end (ProcessDone queued or
    /// start failed).
    finished_tx: watch::Sender<u64>,
    last_diagnostics: Mutex<Vec<String>>,
}

/// Cheaply cloneable handle; clones drive the same supervisor.
#[derive(Clone)]
pub struct JobSupervisor {
    inner: Arc<Inner>,
}

impl fmt::Debug for JobSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSupervisor")
            .field("snapshot", &self.snapshot())
            .field("bus", &self.inner.bus)
            .finish_non_exhaustive()
    }
}

impl JobSupervisor {
    /// Build a supervisor around an explicit gateway and ledger. Creates the
    /// scratch `output/` directory.
    pub fn new(
        gateway: Arc<dyn ContainerRuntimeGateway>,
        ledger: TempResourceLedger,
        bus: EventBus,
    ) -> Result<Self> {
        ledger.prepare()?;
        let decoder = ProtocolDecoder::new(ledger.output_dir());
        let (finished_tx, _) = watch::channel(0);
        let events = EventDispatcher::spawn(bus.clone())?;

        Ok(Self {
            inner: Arc::new(Inner {
                gateway,
                bus,
                events,
                decoder,
                lifecycle: tokio::sync::Mutex::new(()),
                state: Mutex::new(SupervisorState {
                    phase: JobPhase::Idle,
                    current: None,
                    retired: None,
                    suppressed: None,
                    ledger,
                }),
                next_job: AtomicU64::new(0),
                finished_tx,
                last_diagnostics: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Production wiring: Docker gateway and the real filesystem.
    pub fn from_config(cfg: &ConfigFile, bus: EventBus) -> Result<Self> {
        let ledger = TempResourceLedger::new(Arc::new(RealFileSystem), cfg.scratch_dir());
        Self::new(Arc::new(DockerGateway::from_config(cfg)), ledger, bus)
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn output_dir(&self) -> &Path {
        self.inner.decoder.output_dir()
    }

    pub fn snapshot(&self) -> SupervisorSnapshot {
        let state = self.lock_state();
        SupervisorSnapshot {
            phase: state.phase,
            active_job: state.current.as_ref().map(|a| a.id),
            suppressed: state.suppressed,
            live_scratch_files: state.ledger.live_count(),
        }
    }

    pub fn phase(&self) -> JobPhase {
        self.lock_state().phase
    }

    /// Output lines dumped by the most recent failing run, oldest first.
    pub fn last_diagnostics(&self) -> Vec<String> {
        self.inner
            .last_diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start a job, terminating any active one first.
    ///
    /// Returns once the process is running; completion is reported through
    /// the event bus. On failure an `Error(Spawn(..))` event is published as
    /// well and the phase returns to `Idle`.
    pub async fn start(&self, spec: JobSpec) -> Result<JobId> {
        let _gate = self.inner.lifecycle.lock().await;
        self.stop_active(false).await;

        let job = JobId(self.inner.next_job.fetch_add(1, Ordering::Relaxed) + 1);
        info!(%job, kind = ?spec.kind, "starting job");
        self.lock_state().phase = JobPhase::Preparing;

        if !self.inner.gateway.runtime_ready().await {
            return Err(self.fail_start(
                job,
                DreamError::RuntimeUnavailable("container runtime is not ready".to_string()),
            ));
        }

        let launched = {
            let mut state = self.lock_state();
            self.launch_locked(&mut state, job, &spec)
        };

        match launched {
            Ok(()) => Ok(job),
            Err(err) => Err(self.fail_start(job, err)),
        }
    }

    /// Fire-and-forget variant of [`start`](Self::start).
    pub fn start_detached(&self, spec: JobSpec) -> JoinHandle<Result<JobId>> {
        let sup = self.clone();
        tokio::spawn(async move { sup.start(spec).await })
    }

    /// Terminate the active job, if any.
    ///
    /// Its exit code will not be classified, its scratch files are deleted
    /// and the runtime container is torn down. Resolves after the job's
    /// `ProcessDone` was queued for delivery. Subscribers are not waited for.
    pub async fn kill(&self) {
        let _gate = self.inner.lifecycle.lock().await;
        self.stop_active(true).await;
    }

    /// Fire-and-forget variant of [`kill`](Self::kill).
    pub fn kill_detached(&self) -> JoinHandle<()> {
        let sup = self.clone();
        tokio::spawn(async move { sup.kill().await })
    }

    /// Resolve once `job` has ended (its `ProcessDone` was queued, or its
    /// start failed).
    pub async fn wait(&self, job: JobId) {
        let mut rx = self.inner.finished_tx.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|finished| *finished >= job.0).await;
    }

    fn lock_state(&self) -> MutexGuard<'_, SupervisorState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist inputs, build the command and spawn. Runs inside the state
    /// section.
    fn launch_locked(
        &self,
        state: &mut SupervisorState,
        job: JobId,
        spec: &JobSpec,
    ) -> Result<()> {
        let input = state
            .ledger
            .create(job, ResourceRole::Input, &spec.input_image)?;
        let style = match &spec.style_image {
            Some(bytes) => Some(state.ledger.create(job, ResourceRole::Style, bytes)?),
            None => None,
        };

        let input_file = file_name(&input)?;
        let style_file = style.as_deref().map(file_name).transpose()?;
        let scratch_dir = state.ledger.scratch_dir().to_path_buf();

        let command = self.inner.gateway.launch_command(&LaunchRequest {
            spec,
            scratch_dir: &scratch_dir,
            input_file: &input_file,
            style_file: style_file.as_deref(),
        })?;

        info!(%job, command = %command, "spawning job process");
        let child = command
            .to_command()
            .spawn()
            .map_err(|err| DreamError::SpawnFailed(format!("`{}`: {err}", command.program)))?;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let runner = tokio::spawn(run_job(self.clone(), job, child, cancel_rx));

        state.current = Some(ActiveJob {
            id: job,
            cancel: Some(cancel_tx),
            runner: Some(runner),
        });
        state.phase = JobPhase::Running;
        Ok(())
    }

    fn fail_start(&self, job: JobId, err: DreamError) -> DreamError {
        {
            let mut state = self.lock_state();
            state.ledger.release_job(job);
            state.phase = JobPhase::Idle;
        }
        warn!(%job, error = %err, "job could not be started");

        self.inner
            .events
            .send(Event::Error(ErrorDetail::Spawn(err.to_string())));
        self.inner.finished_tx.send_replace(job.0);
        err
    }

    /// Kill semantics. Must be called with the lifecycle gate held.
    async fn stop_active(&self, explicit: bool) {
        let (active, retired) = {
            let mut state = self.lock_state();
            let active = state.current.take();
            if let Some(job) = &active {
                state.suppressed = Some(job.id);
                state.ledger.release_job(job.id);
                state.phase = JobPhase::Cancelled;
            }
            (active, state.retired.take())
        };

        if let Some(runner) = retired {
            await_runner(runner).await;
        }

        let Some(mut active) = active else {
            if explicit {
                debug!("kill requested without an active job; cleaning up runtime only");
                self.teardown_runtime().await;
            }
            return;
        };

        info!(job = %active.id, "killing active job");
        if let Some(cancel) = active.cancel.take() {
            if cancel.send(()).is_err() {
                debug!(job = %active.id, "job runner already finished while cancelling");
            }
        }

        self.teardown_runtime().await;

        if let Some(runner) = active.runner.take() {
            await_runner(runner).await;
        }
    }

    async fn teardown_runtime(&self) {
        if let Err(err) = self.inner.gateway.teardown().await {
            warn!(error = %err, "runtime teardown failed");
        }
    }

    /// Exit handling, executed by the runner task after the process is gone.
    fn finish(&self, job: JobId, report: RunReport, diagnostics: &mut DiagnosticRingBuffer) {
        let code = effective_exit_code(report.exit_code, report.predicted);

        let outcome = {
            let mut state = self.lock_state();

            let suppressed = state.suppressed == Some(job);
            if suppressed {
                state.suppressed = None;
            }

            state.ledger.release_job(job);

            let outcome = if suppressed {
                JobOutcome::Cancelled
            } else {
                let class = ExitClass::classify(code);
                if class.is_success() {
                    JobOutcome::Success
                } else {
                    JobOutcome::Failed(class)
                }
            };

            if state.current.as_ref().is_some_and(|a| a.id == job) {
                state.retired = state.current.take().and_then(|a| a.runner);
                state.phase = match outcome {
                    JobOutcome::Success => JobPhase::Completed,
                    JobOutcome::Failed(_) => JobPhase::Failed,
                    JobOutcome::Cancelled => JobPhase::Cancelled,
                };
            }
            outcome
        };

        if let JobOutcome::Failed(class) = outcome {
            self.inner
                .events
                .send(Event::Error(ErrorDetail::Exit(class)));
        }

        if outcome != JobOutcome::Cancelled && code != 0 {
            let lines = diagnostics.drain();
            warn!(
                %job,
                exit_code = code,
                lines = lines.len(),
                "job failed; dumping last lines of output"
            );
            for line in &lines {
                warn!(%job, "output: {}", line);
            }
            *self
                .inner
                .last_diagnostics
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = lines;
        }

        info!(%job, ?outcome, "job finished");
        self.inner.events.send(Event::ProcessDone(outcome));
        self.inner.finished_tx.send_replace(job.0);
    }
}

async fn run_job(
    sup: JobSupervisor,
    job: JobId,
    mut child: Child,
    cancel_rx: oneshot::Receiver<()>,
) {
    sup.inner.events.send(Event::ProcessStarted);

    let mut diagnostics = DiagnosticRingBuffer::new();
    let report = drive_process(
        job,
        &mut child,
        cancel_rx,
        &sup.inner.decoder,
        &sup.inner.events,
        &mut diagnostics,
    )
    .await;

    sup.finish(job, report, &mut diagnostics);
}

async fn await_runner(runner: JoinHandle<()>) {
    if let Err(err) = runner.await {
        warn!(error = %err, "job runner task ended abnormally");
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| DreamError::SpawnFailed(format!("scratch path {:?} has no file name", path)))
}
