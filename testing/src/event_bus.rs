//! In-memory topic exchange.
//!
//! [`InMemoryEventBus`] routes with the same `*`/`#` binding rules as the real
//! broker and keeps one FIFO per declared queue. Messages are delivered one at
//! a time: the next message of a queue is handed out only after the previous
//! one is settled. Requeued messages go back to the head of their queue with
//! an incremented attempt counter.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on lock poisoning

use fulfillment_core::event_bus::{BusFuture, disposition_or_requeue};
use fulfillment_core::{
    DeadLetter, DeadLetterSink, Disposition, EventBus, EventBusError, FulfillmentEvent,
    IncomingMessage, MessageStream, Topology,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Clone, Debug)]
struct Queued {
    routing_key: String,
    payload: Vec<u8>,
    attempt: u32,
}

#[derive(Debug)]
struct QueueState {
    exchange: String,
    bindings: Vec<String>,
    ready: VecDeque<Queued>,
    in_flight: Option<Queued>,
    acked: usize,
    notify: Arc<Notify>,
}

impl QueueState {
    fn accepts(&self, exchange: &str, routing_key: &str) -> bool {
        self.exchange == exchange
            && self
                .bindings
                .iter()
                .any(|pattern| fulfillment_core::routing::binding_matches(pattern, routing_key))
    }
}

#[derive(Debug, Default)]
struct Inner {
    queues: HashMap<String, QueueState>,
    published: Vec<(String, Vec<u8>)>,
    unrouted: usize,
    fail_publishes: bool,
}

/// In-memory event bus for fast, deterministic tests.
///
/// # Example
///
/// ```
/// use fulfillment_core::{EventBus, Topology};
/// use fulfillment_testing::InMemoryEventBus;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryEventBus::new("events");
/// let topology = Topology::new("events", "delivery-service").bind("order.created");
/// bus.declare_topology(&topology).await?;
///
/// bus.publish("order.created", br#"{"type":"order.created"}"#).await?;
/// assert_eq!(bus.queue_depth("delivery-service"), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryEventBus {
    exchange: String,
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryEventBus {
    /// Create a bus publishing to `exchange`.
    #[must_use]
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Every `(routing_key, payload)` accepted by `publish`, in order.
    #[must_use]
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.inner.lock().unwrap().published.clone()
    }

    /// Published payloads decoded as events (undecodable ones are skipped).
    #[must_use]
    pub fn published_events(&self) -> Vec<FulfillmentEvent> {
        self.published()
            .iter()
            .filter_map(|(_, payload)| FulfillmentEvent::from_json(payload).ok())
            .collect()
    }

    /// Messages published with no matching queue.
    #[must_use]
    pub fn unrouted(&self) -> usize {
        self.inner.lock().unwrap().unrouted
    }

    /// Make every subsequent `publish` fail, simulating a lost connection.
    pub fn set_fail_publishes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_publishes = fail;
    }

    /// Messages waiting in (or being processed from) `queue`.
    #[must_use]
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .queues
            .get(queue)
            .map_or(0, |state| state.ready.len() + usize::from(state.in_flight.is_some()))
    }

    /// Messages acknowledged on `queue`.
    #[must_use]
    pub fn acked(&self, queue: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .queues
            .get(queue)
            .map_or(0, |state| state.acked)
    }

    /// Wait until `queue` has nothing ready or in flight.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_until_drained(&self, queue: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.queue_depth(queue) == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.queue_depth(queue) == 0
    }

    /// Inject a raw message straight into `queue`, bypassing routing.
    pub fn inject(&self, queue: &str, routing_key: &str, payload: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(state) = inner.queues.get_mut(queue) {
            state.ready.push_back(Queued {
                routing_key: routing_key.to_string(),
                payload: payload.to_vec(),
                attempt: 1,
            });
            state.notify.notify_one();
        }
    }

    fn take_next(&self, queue: &str) -> Option<Queued> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.queues.get_mut(queue)?;
        let next = state.ready.pop_front()?;
        state.in_flight = Some(next.clone());
        Some(next)
    }

    fn settle(&self, queue: &str, disposition: Disposition) {
        let mut inner = self.inner.lock().unwrap();
        let Some(state) = inner.queues.get_mut(queue) else {
            return;
        };
        let Some(message) = state.in_flight.take() else {
            return;
        };
        match disposition {
            Disposition::Ack => state.acked += 1,
            Disposition::Requeue { .. } => state.ready.push_front(Queued {
                attempt: message.attempt + 1,
                ..message
            }),
        }
    }
}

impl EventBus for InMemoryEventBus {
    fn declare_topology<'a>(&'a self, topology: &'a Topology) -> BusFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            let state = inner
                .queues
                .entry(topology.queue.clone())
                .or_insert_with(|| QueueState {
                    exchange: topology.exchange.clone(),
                    bindings: Vec::new(),
                    ready: VecDeque::new(),
                    in_flight: None,
                    acked: 0,
                    notify: Arc::new(Notify::new()),
                });
            for key in &topology.routing_keys {
                if !state.bindings.contains(key) {
                    state.bindings.push(key.clone());
                }
            }
            Ok(())
        })
    }

    fn publish<'a>(&'a self, routing_key: &'a str, payload: &'a [u8]) -> BusFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_publishes {
                return Err(EventBusError::PublishFailed {
                    routing_key: routing_key.to_string(),
                    reason: "connection closed".to_string(),
                });
            }
            inner
                .published
                .push((routing_key.to_string(), payload.to_vec()));

            let mut routed = false;
            for state in inner.queues.values_mut() {
                if state.accepts(&self.exchange, routing_key) {
                    state.ready.push_back(Queued {
                        routing_key: routing_key.to_string(),
                        payload: payload.to_vec(),
                        attempt: 1,
                    });
                    state.notify.notify_one();
                    routed = true;
                }
            }
            if !routed {
                inner.unrouted += 1;
            }
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, topology: &'a Topology) -> BusFuture<'a, MessageStream> {
        Box::pin(async move {
            let notify = {
                let mut inner = self.inner.lock().unwrap();
                let state = inner.queues.get_mut(&topology.queue).ok_or_else(|| {
                    EventBusError::SubscriptionFailed {
                        queue: topology.queue.clone(),
                        reason: "queue not declared".to_string(),
                    }
                })?;
                // A previous subscriber went away mid-message: redeliver it.
                if let Some(message) = state.in_flight.take() {
                    state.ready.push_front(Queued {
                        attempt: message.attempt + 1,
                        ..message
                    });
                }
                Arc::clone(&state.notify)
            };

            let bus = self.clone();
            let queue = topology.queue.clone();
            let stream = async_stream::stream! {
                loop {
                    let Some(next) = bus.take_next(&queue) else {
                        notify.notified().await;
                        continue;
                    };
                    let (message, settled) =
                        IncomingMessage::new(next.routing_key, next.payload, next.attempt);
                    yield Ok(message);

                    let disposition = disposition_or_requeue(settled.await);
                    if let Disposition::Requeue { delay } = disposition {
                        tokio::time::sleep(delay).await;
                    }
                    bus.settle(&queue, disposition);
                }
                // Pins the stream body's output to `()` (edition 2024 never-type fallback).
                #[allow(unreachable_code)]
                ()
            };
            Ok(Box::pin(stream) as MessageStream)
        })
    }
}

/// Dead-letter sink that keeps everything in memory.
#[derive(Clone, Debug, Default)]
pub struct RecordingDeadLetters {
    letters: Arc<Mutex<Vec<DeadLetter>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingDeadLetters {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().unwrap().clone()
    }

    /// Make `record` fail, simulating an unreachable store.
    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait::async_trait]
impl DeadLetterSink for RecordingDeadLetters {
    async fn record(&self, letter: DeadLetter) -> Result<(), EventBusError> {
        if *self.fail.lock().unwrap() {
            return Err(EventBusError::DeadLetterFailed("store offline".to_string()));
        }
        self.letters.lock().unwrap().push(letter);
        Ok(())
    }
}
