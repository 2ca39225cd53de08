// src/events/bus.rs

//! In-process publish/subscribe for job events.
//!
//! Every published event is handed to each subscriber synchronously, in
//! registration order, on the publishing thread. The supervisor publishes
//! through an [`EventDispatcher`](super::EventDispatcher), so that thread is
//! the dispatcher's and never the job runner's. Subscribers are isolated from
//! the producer:
//! - an `Err` returned from [`Subscribe::on_event`] is logged and dropped,
//! - a panic inside a subscriber is caught and logged,
//! - the registry lock is released before delivery, so a subscriber may
//!   (un)subscribe from inside its callback.
//!
//! Consumers that need to do slow or async work should use
//! [`EventBus::subscribe_channel`] and process events from the returned
//! receiver on their own task; delivery into the channel never blocks.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::Event;

/// Observer of job events.
pub trait Subscribe: Send + Sync {
    fn on_event(&self, event: &Event) -> anyhow::Result<()>;

    /// Name used in log lines about this subscriber.
    fn name(&self) -> &str {
        "subscriber"
    }
}

/// Handle returned by `subscribe*`, used to unsubscribe again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    subscriber: Arc<dyn Subscribe>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<Registration>>,
}

/// Cheaply cloneable event bus; clones share one registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscribe>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(subscriber = subscriber.name(), ?id, "subscriber registered");
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration { id, subscriber });
        id
    }

    /// Register a closure as subscriber.
    pub fn subscribe_fn<F>(&self, name: &str, f: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnSubscriber {
            name: name.to_string(),
            f,
        }))
    }

    /// Register an unbounded channel; every event is cloned into it.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(Arc::new(ChannelSubscriber { tx }));
        (id, rx)
    }

    /// Remove a subscriber. Returns `false` if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|r| r.id != id);
        before != subs.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `event` to every subscriber, in registration order.
    pub fn publish(&self, event: &Event) {
        let snapshot: Vec<Arc<dyn Subscribe>> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| Arc::clone(&r.subscriber))
            .collect();

        for sub in snapshot {
            match catch_unwind(AssertUnwindSafe(|| sub.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(
                        subscriber = sub.name(),
                        event = event.name(),
                        error = %err,
                        "subscriber failed to handle event"
                    );
                }
                Err(panic) => {
                    error!(
                        subscriber = sub.name(),
                        event = event.name(),
                        panic = %panic_message(panic.as_ref()),
                        "subscriber panicked while handling event"
                    );
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

struct FnSubscriber<F> {
    name: String,
    f: F,
}

impl<F> Subscribe for FnSubscriber<F>
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        (self.f)(event);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<Event>,
}

impl Subscribe for ChannelSubscriber {
    fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        if self.tx.send(event.clone()).is_err() {
            debug!(event = event.name(), "channel subscriber receiver dropped");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "channel"
    }
}
