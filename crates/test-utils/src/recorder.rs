use std::time::Duration;

use dreamrunner::events::{Event, EventBus, JobOutcome, SubscriptionId};
use tokio::sync::mpsc;

/// Collects events published on a bus, in delivery order.
pub struct EventRecorder {
    pub id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventRecorder {
    pub fn attach(bus: &EventBus) -> Self {
        let (id, rx) = bus.subscribe_channel();
        Self { id, rx }
    }

    /// Receive events up to and including the next `ProcessDone`.
    ///
    /// Panics after 5 seconds without one.
    pub async fn until_done(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
                .await
                .unwrap_or_else(|_| panic!("no ProcessDone within 5s; got {events:?}"))
                .expect("event bus dropped");
            let done = matches!(event, Event::ProcessDone(_));
            events.push(event);
            if done {
                return events;
            }
        }
    }

    /// Next delivered event. Panics after 5 seconds without one.
    pub async fn next(&mut self) -> Event {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("no event within 5s")
            .expect("event bus dropped")
    }

    /// Like [`until_done`](Self::until_done) but only returns the outcome.
    pub async fn outcome(&mut self) -> JobOutcome {
        match self.until_done().await.pop() {
            Some(Event::ProcessDone(outcome)) => outcome,
            other => panic!("expected ProcessDone, got {other:?}"),
        }
    }

    /// Events already delivered, without waiting. Delivery happens on the
    /// dispatcher thread, so only use this where nothing can be in flight.
    pub fn drain_now(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
