// src/events/dispatch.rs

//! Ordered hand-off from the job runner to the subscribers.
//!
//! ```text
//! runner ── send(event) ──► [unbounded queue] ──► dispatcher thread ──► bus.publish
//! ```
//!
//! `send` never waits for a subscriber, so a slow or stuck subscriber cannot
//! hold up stdout reading, exit handling or `kill`. The single dispatcher
//! thread keeps one global FIFO order across all runs of a supervisor.

use std::io;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Event, EventBus};

const DISPATCHER_THREAD_NAME: &str = "dreamrunner-events";

pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<Event>,
    worker: thread::JoinHandle<()>,
}

impl EventDispatcher {
    /// Start the dispatcher thread delivering into `bus`.
    ///
    /// The thread stops once the dispatcher is dropped and the queue is
    /// drained.
    pub fn spawn(bus: EventBus) -> io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let worker = thread::Builder::new()
            .name(DISPATCHER_THREAD_NAME.to_string())
            .spawn(move || {
                while let Some(event) = rx.blocking_recv() {
                    bus.publish(&event);
                }
                debug!("event dispatcher stopped");
            })?;

        Ok(Self { tx, worker })
    }

    /// Queue `event` for delivery. Never blocks.
    pub fn send(&self, event: Event) {
        if let Err(err) = self.tx.send(event) {
            warn!(event = err.0.name(), "event dispatcher is gone; dropping event");
        }
    }

    /// Close the queue and wait until every queued event was delivered.
    pub fn shutdown(self) {
        let Self { tx, worker } = self;
        drop(tx);
        if worker.join().is_err() {
            warn!("event dispatcher thread panicked");
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    #[test]
    fn delivers_in_send_order() {
        let bus = EventBus::new();
        let (_id, mut rx) = bus.subscribe_channel();
        let dispatcher = EventDispatcher::spawn(bus).unwrap();

        dispatcher.send(Event::ProcessStarted);
        dispatcher.send(Event::StepStarted("0".into()));
        dispatcher.send(Event::AllCompleted);
        dispatcher.shutdown();

        assert_eq!(rx.try_recv().unwrap(), Event::ProcessStarted);
        assert_eq!(rx.try_recv().unwrap(), Event::StepStarted("0".into()));
        assert_eq!(rx.try_recv().unwrap(), Event::AllCompleted);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_returns_while_a_subscriber_is_stuck() {
        let bus = EventBus::new();
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let release_rx = std::sync::Mutex::new(release_rx);
        bus.subscribe_fn("stuck", move |_| {
            let _ = release_rx.lock().unwrap().recv();
        });
        let (_id, mut rx) = bus.subscribe_channel();
        let dispatcher = EventDispatcher::spawn(bus).unwrap();

        dispatcher.send(Event::ProcessStarted);
        dispatcher.send(Event::AllCompleted);
        std::thread::sleep(Duration::from_millis(20));
        assert!(rx.try_recv().is_err());

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        dispatcher.shutdown();
        assert_eq!(rx.try_recv().unwrap(), Event::ProcessStarted);
        assert_eq!(rx.try_recv().unwrap(), Event::AllCompleted);
    }
}
