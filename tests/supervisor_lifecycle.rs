#![cfg(unix)]

mod common;
use crate::common::{Harness, ScriptedGateway, with_timeout};

use std::sync::Arc;

use dreamrunner::errors::DreamError;
use dreamrunner::events::{ErrorDetail, Event, JobOutcome};
use dreamrunner::exec::ExitClass;
use dreamrunner::types::{JobPhase, JobSpec};

fn deep_dream() -> JobSpec {
    JobSpec::deep_dream(b"fake jpeg".to_vec(), "inception_4c/output")
}

fn errors(events: &[Event]) -> Vec<&Event> {
    events.iter().filter(|e| e.is_error()).collect()
}

#[tokio::test]
async fn successful_run_publishes_events_in_order() {
    let mut h = Harness::new(
        r#"test -f "$1/$2" || exit 3
printf '*processstarted:\n*stepstarted:0\n*totalprogress:12.5\n*stepcomplete:1\n*allcomplete:\n'"#,
    );

    let job = h.supervisor.start(deep_dream()).await.unwrap();
    let events = h.events.until_done().await;

    assert_eq!(
        events,
        vec![
            Event::ProcessStarted,
            Event::StepStarted("0".into()),
            Event::TotalProgress(12.5),
            Event::StepCompleted("1".into()),
            Event::AllCompleted,
            Event::ProcessDone(JobOutcome::Success),
        ]
    );

    with_timeout(h.supervisor.wait(job)).await;
    assert!(h.scratch_files().is_empty());
    assert!(h.supervisor.last_diagnostics().is_empty());

    let snap = h.supervisor.snapshot();
    assert_eq!(snap.phase, JobPhase::Completed);
    assert_eq!(snap.active_job, None);
    assert_eq!(snap.live_scratch_files, 0);
    assert_eq!(h.gateway.teardown_count(), 0);
}

#[tokio::test]
async fn input_files_are_visible_to_the_process() {
    let mut h = Harness::new(r#"cat "$1/$2"; echo; cat "$1/$3""#);

    h.supervisor
        .start(JobSpec::neural_art(b"content".to_vec(), b"style".to_vec()))
        .await
        .unwrap();
    assert_eq!(h.supervisor.snapshot().live_scratch_files, 2);

    assert_eq!(h.events.outcome().await, JobOutcome::Success);
    assert!(h.scratch_files().is_empty());

    let launch = &h.gateway.launches()[0];
    assert!(launch.args[4].starts_with("dream-1-input-"));
    assert!(launch.args[5].starts_with("dream-1-style-"));
}

#[tokio::test]
async fn out_of_memory_kill_is_classified_and_dumps_diagnostics() {
    let mut h = Harness::new("echo '*stepstarted:0'; echo 'allocating'; kill -9 $$");

    h.supervisor.start(deep_dream()).await.unwrap();
    let events = h.events.until_done().await;

    assert_eq!(
        errors(&events),
        vec![&Event::Error(ErrorDetail::Exit(ExitClass::OutOfMemory))]
    );
    assert_eq!(
        &events[events.len() - 2..],
        &[
            Event::Error(ErrorDetail::Exit(ExitClass::OutOfMemory)),
            Event::ProcessDone(JobOutcome::Failed(ExitClass::OutOfMemory)),
        ]
    );
    assert_eq!(
        h.supervisor.last_diagnostics(),
        vec!["*stepstarted:0".to_string(), "allocating".to_string()]
    );
    assert_eq!(h.supervisor.phase(), JobPhase::Failed);
    assert!(h.scratch_files().is_empty());
}

#[tokio::test]
async fn announced_crash_code_replaces_generic_failure() {
    let mut h = Harness::new("echo '*possibleerror:137'; exit 1");

    h.supervisor.start(deep_dream()).await.unwrap();
    let events = h.events.until_done().await;

    assert!(events.contains(&Event::PossibleError(Some(137))));
    assert_eq!(
        events.last(),
        Some(&Event::ProcessDone(JobOutcome::Failed(ExitClass::OutOfMemory)))
    );
}

#[tokio::test]
async fn all_completed_clears_the_announced_crash_code() {
    let mut h = Harness::new("echo '*possibleerror:137'; echo '*allcomplete:'; exit 1");

    h.supervisor.start(deep_dream()).await.unwrap();

    assert_eq!(
        h.events.outcome().await,
        JobOutcome::Failed(ExitClass::Undefined(1))
    );
}

#[tokio::test]
async fn working_directory_error_is_classified() {
    let mut h = Harness::new("echo 'cannot mount'; exit 125");

    h.supervisor.start(deep_dream()).await.unwrap();

    assert_eq!(
        h.events.outcome().await,
        JobOutcome::Failed(ExitClass::WorkingDirectoryError)
    );
    assert_eq!(h.supervisor.last_diagnostics(), vec!["cannot mount".to_string()]);
}

#[tokio::test]
async fn reported_errors_pass_through_without_failing_the_job() {
    let mut h = Harness::new("printf '*error: model missing \\r\\n*savedimage:/data/output/out.jpg\\n'");

    h.supervisor.start(deep_dream()).await.unwrap();
    let events = h.events.until_done().await;

    assert_eq!(
        events,
        vec![
            Event::ProcessStarted,
            Event::Error(ErrorDetail::Reported("model missing".into())),
            Event::ImageSaved(h.scratch_dir().join("output").join("out.jpg")),
            Event::ProcessDone(JobOutcome::Success),
        ]
    );
}

#[tokio::test]
async fn kill_cancels_without_classifying() {
    let mut h = Harness::new("echo '*stepstarted:0'; exec sleep 30");

    h.supervisor.start(deep_dream()).await.unwrap();
    with_timeout(h.supervisor.kill()).await;

    // kill resolves after the job's final event was published.
    assert!(h.scratch_files().is_empty());
    let snap = h.supervisor.snapshot();
    assert_eq!(snap.phase, JobPhase::Cancelled);
    assert_eq!(snap.suppressed, None);
    assert_eq!(snap.live_scratch_files, 0);
    assert_eq!(h.gateway.teardown_count(), 1);

    let events = h.events.until_done().await;
    assert_eq!(events.first(), Some(&Event::ProcessStarted));
    assert_eq!(events.last(), Some(&Event::ProcessDone(JobOutcome::Cancelled)));
    assert!(errors(&events).is_empty(), "unexpected errors: {events:?}");
    assert!(h.supervisor.last_diagnostics().is_empty());
}

#[tokio::test]
async fn kill_right_after_start_before_any_output() {
    let mut h = Harness::new("exec sleep 30");

    let job = h.supervisor.start(deep_dream()).await.unwrap();
    assert_eq!(h.scratch_files().len(), 1);
    with_timeout(h.supervisor.kill()).await;

    assert!(h.scratch_files().is_empty());
    let snap = h.supervisor.snapshot();
    assert_eq!(snap.suppressed, None);
    assert_eq!(snap.active_job, None);
    assert_eq!(snap.live_scratch_files, 0);
    with_timeout(h.supervisor.wait(job)).await;

    let events = h.events.until_done().await;
    assert_eq!(
        events,
        vec![Event::ProcessStarted, Event::ProcessDone(JobOutcome::Cancelled)]
    );
    assert!(errors(&events).is_empty());
}

#[tokio::test]
async fn kill_without_job_does_not_suppress_the_next_run() {
    let mut h = Harness::new("exit 1");

    with_timeout(h.supervisor.kill()).await;
    assert_eq!(h.gateway.teardown_count(), 1);
    assert!(h.events.drain_now().is_empty());

    h.supervisor.start(deep_dream()).await.unwrap();
    assert_eq!(
        h.events.outcome().await,
        JobOutcome::Failed(ExitClass::Undefined(1))
    );
}

#[tokio::test]
async fn start_replaces_the_active_job() {
    let mut h = Harness::new("exec sleep 30");

    let first = h.supervisor.start(deep_dream()).await.unwrap();
    h.gateway.set_script("echo '*allcomplete:'");
    let second = with_timeout(h.supervisor.start(deep_dream())).await.unwrap();
    assert_ne!(first, second);

    // The first run is fully reported before the second one begins.
    let first_events = h.events.until_done().await;
    assert_eq!(first_events.first(), Some(&Event::ProcessStarted));
    assert_eq!(
        first_events.last(),
        Some(&Event::ProcessDone(JobOutcome::Cancelled))
    );

    let second_events = h.events.until_done().await;
    assert_eq!(
        second_events,
        vec![
            Event::ProcessStarted,
            Event::AllCompleted,
            Event::ProcessDone(JobOutcome::Success),
        ]
    );

    assert_eq!(h.gateway.teardown_count(), 1);
    assert!(h.scratch_files().is_empty());
}

#[tokio::test]
async fn unready_runtime_fails_the_start() {
    let gateway = Arc::new(ScriptedGateway::new("exit 0"));
    gateway.set_ready(false);
    let mut h = Harness::with_gateway(gateway);

    let err = h.supervisor.start(deep_dream()).await.unwrap_err();

    assert!(matches!(err, DreamError::RuntimeUnavailable(_)));
    assert!(matches!(h.events.next().await, Event::Error(ErrorDetail::Spawn(_))));
    assert!(h.gateway.launches().is_empty());
    assert!(h.scratch_files().is_empty());
    assert_eq!(h.supervisor.phase(), JobPhase::Idle);
}

#[tokio::test]
async fn wait_resolves_for_finished_and_failed_starts() {
    let gateway = Arc::new(ScriptedGateway::new("exit 0"));
    let h = Harness::with_gateway(gateway.clone());

    let job = h.supervisor.start(deep_dream()).await.unwrap();
    with_timeout(h.supervisor.wait(job)).await;
    assert_eq!(h.supervisor.phase(), JobPhase::Completed);

    gateway.set_ready(false);
    assert!(h.supervisor.start(deep_dream()).await.is_err());
    // A failed start still counts as an ended job.
    with_timeout(h.supervisor.wait(job)).await;
}

#[tokio::test]
async fn detached_start_and_kill() {
    let mut h = Harness::new("exec sleep 30");

    let job = h.supervisor.start_detached(deep_dream()).await.unwrap().unwrap();
    assert_eq!(h.supervisor.snapshot().active_job, Some(job));

    h.supervisor.kill_detached().await.unwrap();
    assert_eq!(h.events.outcome().await, JobOutcome::Cancelled);
}
