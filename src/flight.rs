//! In-flight request registry
//!
//! At most one pipeline runs per key. The first caller becomes the leader and
//! owns a [`Publisher`]; callers arriving while it runs attach to the same
//! flight. A flight keeps every event it has published, so a late subscriber
//! replays the whole sequence and ends on the same terminal outcome.
//!
//! The registry entry is removed before the terminal event is published. A
//! caller that starts after observing completion always gets a fresh pipeline.

use crate::error::{LiveboxError, LiveboxResult};
use crate::key::RequestKey;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::any::{type_name, Any};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Async sequence of results delivered to a caller
pub type LiveboxStream<O> = BoxStream<'static, LiveboxResult<O>>;

type AnyFlight = Arc<dyn Any + Send + Sync>;

struct EventLog<O> {
    events: Vec<LiveboxResult<O>>,
    done: bool,
}

/// One running pipeline and everything it has published so far
pub(crate) struct Flight<O> {
    log: watch::Sender<EventLog<O>>,
}

impl<O> Flight<O>
where
    O: Clone + Send + Sync + 'static,
{
    fn new() -> Self {
        let (log, _) = watch::channel(EventLog {
            events: Vec::new(),
            done: false,
        });
        Self { log }
    }

    fn subscribe(&self) -> Subscription<O> {
        Subscription {
            log: self.log.subscribe(),
            cursor: 0,
        }
    }

    fn push(&self, event: LiveboxResult<O>) {
        self.log.send_modify(|log| log.events.push(event));
    }

    fn close(&self, error: Option<LiveboxError>) {
        self.log.send_modify(|log| {
            if let Some(error) = error {
                log.events.push(Err(error));
            }
            log.done = true;
        });
    }
}

/// Replaying reader over a flight
pub(crate) struct Subscription<O> {
    log: watch::Receiver<EventLog<O>>,
    cursor: usize,
}

impl<O> Subscription<O>
where
    O: Clone + Send + Sync + 'static,
{
    /// Next event, `None` once the flight has completed
    pub(crate) async fn next(&mut self) -> Option<LiveboxResult<O>> {
        loop {
            {
                let log = self.log.borrow_and_update();
                if let Some(event) = log.events.get(self.cursor) {
                    self.cursor += 1;
                    return Some(event.clone());
                }
                if log.done {
                    return None;
                }
            }

            if self.log.changed().await.is_err() {
                let log = self.log.borrow();
                let event = log.events.get(self.cursor).cloned();
                self.cursor += 1;
                return event;
            }
        }
    }

    pub(crate) fn into_stream(self) -> LiveboxStream<O> {
        stream::unfold(self, |mut subscription| async move {
            let event = subscription.next().await?;
            Some((event, subscription))
        })
        .boxed()
    }
}

/// Write side of a flight, held by the pipeline task
///
/// Dropping it without [`Publisher::finish`] (a panicking pipeline) still
/// unregisters the key and fails every subscriber.
pub(crate) struct Publisher<O>
where
    O: Clone + Send + Sync + 'static,
{
    key: RequestKey,
    flight: Arc<Flight<O>>,
    registry: Arc<InFlight>,
    finished: bool,
}

impl<O> Publisher<O>
where
    O: Clone + Send + Sync + 'static,
{
    pub(crate) fn key(&self) -> &RequestKey {
        &self.key
    }

    pub(crate) fn emit(&self, value: O) {
        self.flight.push(Ok(value));
    }

    /// Unregister the key, then publish the terminal event
    pub(crate) fn finish(mut self, error: Option<LiveboxError>) {
        self.finished = true;
        self.registry.remove(&self.key, &self.flight);
        self.flight.close(error);
    }
}

impl<O> Drop for Publisher<O>
where
    O: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("Pipeline for key {} ended without completing", self.key);
        self.registry.remove(&self.key, &self.flight);
        self.flight.close(Some(LiveboxError::Internal(format!(
            "pipeline for key {} was aborted",
            self.key
        ))));
    }
}

/// Outcome of joining the registry
pub(crate) enum Joined<O>
where
    O: Clone + Send + Sync + 'static,
{
    /// No flight was running; the caller must drive the pipeline
    Leader {
        publisher: Publisher<O>,
        subscription: Subscription<O>,
    },
    /// Attached to a running flight
    Attached(Subscription<O>),
}

/// Process-wide map from key to running flight
#[derive(Default)]
pub(crate) struct InFlight {
    flights: DashMap<RequestKey, AnyFlight>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Attach to the running flight for `key` or register a new one atomically
    pub(crate) fn join<O>(self: &Arc<Self>, key: &RequestKey) -> LiveboxResult<Joined<O>>
    where
        O: Clone + Send + Sync + 'static,
    {
        match self.flights.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let flight = entry.get().clone().downcast::<Flight<O>>().map_err(|_| {
                    LiveboxError::Configuration(format!(
                        "key {} is in flight with an output type other than {}",
                        key,
                        type_name::<O>()
                    ))
                })?;
                debug!("Attaching to in-flight request for key: {}", key);
                Ok(Joined::Attached(flight.subscribe()))
            }
            Entry::Vacant(entry) => {
                let flight = Arc::new(Flight::<O>::new());
                entry.insert(flight.clone());
                debug!("Registered in-flight request for key: {}", key);

                let subscription = flight.subscribe();
                Ok(Joined::Leader {
                    publisher: Publisher {
                        key: key.clone(),
                        flight,
                        registry: self.clone(),
                        finished: false,
                    },
                    subscription,
                })
            }
        }
    }

    /// Remove `key` only while it still maps to `flight`
    fn remove<O>(&self, key: &RequestKey, flight: &Arc<Flight<O>>) {
        let target = Arc::as_ptr(flight) as *const ();
        let removed = self
            .flights
            .remove_if(key, |_, current| Arc::as_ptr(current) as *const () == target);
        if removed.is_some() {
            debug!("Removed in-flight request for key: {}", key);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.flights.len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &RequestKey) -> bool {
        self.flights.contains_key(key)
    }
}
