// src/exec/job_runner.rs

//! Drives one spawned job process until it exits or is cancelled.
//!
//! Stdout is consumed line by line as data arrives; every line goes into the
//! diagnostic ring buffer, is decoded, and the resulting event (if any) is
//! queued before the next line is read. Stderr is drained at `debug` so
//! the pipe never fills up.

use std::process::ExitStatus;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventDispatcher};
use crate::exec::diagnostics::DiagnosticRingBuffer;
use crate::protocol::{Decoded, ProtocolDecoder};
use crate::types::JobId;

/// What the runner observed by the time the process was gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Raw exit code; signal terminations are reported as `128 + signal`.
    pub exit_code: i32,
    /// Last crash code announced through `*possibleerror:`.
    pub predicted: Option<i32>,
    /// The process was killed because of a cancellation request.
    pub cancelled: bool,
}

/// Pump stdout into the event queue and wait for the process to exit.
///
/// If `cancel_rx` fires, reading stops immediately (no further lines are
/// published) and the child is killed.
pub async fn drive_process(
    job: JobId,
    child: &mut Child,
    mut cancel_rx: oneshot::Receiver<()>,
    decoder: &ProtocolDecoder,
    events: &EventDispatcher,
    diagnostics: &mut DiagnosticRingBuffer,
) -> RunReport {
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();

            while let Ok(Some(line)) = lines.next_line().await {
                debug!(%job, "stderr: {}", line);
            }
        });
    }

    let mut predicted = None;
    // A dropped sender resolves the receiver with an error; stop polling it.
    let mut cancel_armed = true;
    let mut cancelled = false;

    if let Some(stdout) = child.stdout.take() {
        let mut reader = BufReader::new(stdout);
        // Only cleared after a full line was handled: `read_until` keeps
        // partial data in the buffer when its future is dropped.
        let mut buf = Vec::new();

        loop {
            tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => {
                    match read {
                        Ok(0) => {
                            if !buf.is_empty() {
                                let line = raw_line(&buf);
                                handle_line(job, line, decoder, events, diagnostics, &mut predicted);
                            }
                            break;
                        }
                        Ok(_) => {
                            let line = raw_line(&buf);
                            buf.clear();
                            handle_line(job, line, decoder, events, diagnostics, &mut predicted);
                        }
                        Err(err) => {
                            warn!(%job, error = %err, "failed to read job stdout; ignoring the rest");
                            break;
                        }
                    }
                }

                res = &mut cancel_rx, if cancel_armed => {
                    cancel_armed = false;
                    if res.is_ok() {
                        cancelled = true;
                        break;
                    }
                }
            }
        }
    }

    let status = loop {
        if cancelled {
            info!(%job, "cancellation requested; killing job process");
            if let Err(err) = child.start_kill() {
                warn!(%job, error = %err, "failed to kill job process");
            }
            break child.wait().await;
        }

        tokio::select! {
            status = child.wait() => break status,
            res = &mut cancel_rx, if cancel_armed => {
                cancel_armed = false;
                cancelled = res.is_ok();
            }
        }
    };

    let exit_code = match status {
        Ok(status) => exit_code_of(&status),
        Err(err) => {
            error!(%job, error = %err, "waiting for job process failed");
            -1
        }
    };

    info!(%job, exit_code, cancelled, "job process exited");

    RunReport {
        exit_code,
        predicted,
        cancelled,
    }
}

fn handle_line(
    job: JobId,
    line: String,
    decoder: &ProtocolDecoder,
    events: &EventDispatcher,
    diagnostics: &mut DiagnosticRingBuffer,
    predicted: &mut Option<i32>,
) {
    debug!(%job, "stdout: {}", line);
    let decoded = decoder.decode(&line);
    diagnostics.push(line);

    let Decoded::Event(event) = decoded else {
        return;
    };

    match &event {
        Event::PossibleError(code) => {
            warn!(%job, code = ?code, "job announced a possible crash");
            *predicted = *code;
        }
        Event::AllCompleted => *predicted = None,
        _ => {}
    }

    events.send(event);
}

/// Lossy UTF-8 with the line terminator (`\n` or `\r\n`) removed.
fn raw_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && buf[end - 1] == b'\r' {
        end -= 1;
    }
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn exit_code_of(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::exec::diagnostics::DIAGNOSTIC_CAPACITY;
    use proptest::prelude::*;

    #[test]
    fn raw_line_strips_terminators() {
        assert_eq!(raw_line(b"*allcomplete:\r\n"), "*allcomplete:");
        assert_eq!(raw_line(b"plain\n"), "plain");
        assert_eq!(raw_line(b"no newline"), "no newline");
        assert_eq!(raw_line(b"\n"), "");
    }

    #[test]
    fn raw_line_is_lossy_on_invalid_utf8() {
        assert_eq!(raw_line(b"*error:\xff\n"), "*error:\u{fffd}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signal_termination_maps_to_shell_convention() {
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("kill -9 $$")
            .spawn()
            .unwrap();
        let status = child.wait().await.unwrap();
        assert_eq!(exit_code_of(&status), 137);
    }

    const NAMES: &[&str] = &[
        "totalprogress",
        "Progress",
        "stepstarted",
        "STEPCOMPLETE",
        "allcomplete",
        "savedimage",
        "error",
        "possibleerror",
        "processstarted",
        "unknown",
    ];

    // Protocol-shaped lines (known and unknown names, good and bad payloads)
    // mixed with free-form noise.
    fn output_line() -> impl Strategy<Value = String> {
        prop_oneof![
            (
                proptest::sample::select(NAMES),
                prop_oneof!["-?[0-9]{1,3}(\\.[0-9]{1,2})?", "[a-z/ .:]{0,12}"],
            )
                .prop_map(|(name, payload)| format!("*{name}:{payload}")),
            "[^*\\r\\n][^\\r\\n]{0,20}",
            Just(String::new()),
        ]
    }

    proptest! {
        #[test]
        fn queued_events_are_the_ordered_non_ignored_decodes(
            lines in proptest::collection::vec(output_line(), 0..40)
        ) {
            let decoder = ProtocolDecoder::new("/scratch/output");
            let bus = EventBus::new();
            let (_id, mut rx) = bus.subscribe_channel();
            let events = EventDispatcher::spawn(bus).unwrap();
            let mut diagnostics = DiagnosticRingBuffer::new();
            let mut predicted = None;

            for line in &lines {
                handle_line(JobId(1), line.clone(), &decoder, &events, &mut diagnostics, &mut predicted);
            }
            events.shutdown();

            let mut published = Vec::new();
            while let Ok(event) = rx.try_recv() {
                published.push(event);
            }
            let expected: Vec<Event> = lines
                .iter()
                .filter_map(|line| decoder.decode(line).into_event())
                .collect();

            prop_assert_eq!(published, expected);
            let kept = lines.len().min(DIAGNOSTIC_CAPACITY);
            prop_assert_eq!(diagnostics.drain(), lines[lines.len() - kept..].to_vec());
        }
    }
}
