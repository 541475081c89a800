//! Redpanda event bus implementation for the fulfillment services.
//!
//! This crate provides a production-ready Redpanda-based event bus that implements
//! the [`EventBus`] trait from `fulfillment-core`. It uses rdkafka for Kafka-compatible
//! event streaming.
//!
//! # Topic-exchange mapping
//!
//! The services are written against topic-exchange semantics (one exchange,
//! one durable queue per service, `*`/`#` bindings). On a Kafka-compatible
//! broker these map as follows:
//!
//! | Exchange concept          | Kafka concept                                     |
//! |---------------------------|---------------------------------------------------|
//! | exchange + routing key    | topic `{exchange}.{routing_key}`                  |
//! | durable queue             | consumer group (committed offsets survive restart)|
//! | exact binding             | topic subscription, topic pre-created             |
//! | wildcard binding          | regex subscription (`^events\.order\.[^.]+$`)     |
//! | ack                       | offset commit                                     |
//! | requeue                   | seek back to the message offset after a delay     |
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Offsets are committed only when the handler acknowledges the message
//! - If the process crashes before commit, messages will be redelivered
//! - Subscribers MUST be idempotent
//! - One message per consumer is in flight at a time
//!
//! # Example
//!
//! ```no_run
//! use fulfillment_redpanda::RedpandaEventBus;
//! use fulfillment_core::{EventBus, Topology};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .exchange("events")
//!     .connect()
//!     .await?;
//!
//! let topology = Topology::new("events", "delivery-service").bind("order.created");
//! event_bus.declare_topology(&topology).await?;
//! event_bus.publish("order.created", br#"{"type":"order.created"}"#).await?;
//!
//! let mut stream = event_bus.subscribe(&topology).await?;
//! while let Some(result) = stream.next().await {
//!     let message = result?;
//!     println!("Received: {}", message.routing_key());
//!     message.ack();
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use fulfillment_core::event_bus::{BusFuture, disposition_or_requeue};
use fulfillment_core::routing::{binding_regex, is_wildcard};
use fulfillment_core::{
    Disposition, EventBus, EventBusError, IncomingMessage, MessageStream, Topology,
};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{Offset, TopicPartitionList};
use std::collections::HashMap;
use std::time::Duration;

/// Redpanda event bus implementation.
///
/// # Configuration
///
/// - **Broker addresses**: Bootstrap servers (required)
/// - **Exchange**: topic prefix shared by every service (default: `events`)
/// - **Producer acks**: default `all`, so a published message is replicated
///   before the broker reports it delivered
/// - **Offset reset**: where a new consumer group starts (default: `earliest`,
///   so messages published before a queue's first consumer are not lost)
pub struct RedpandaEventBus {
    /// Kafka producer for publishing events
    producer: FutureProducer,
    /// Admin client for topic creation
    admin: AdminClient<DefaultClientContext>,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Exchange name, used as topic prefix
    exchange: String,
    /// Metadata/seek timeout
    timeout: Duration,
    /// Auto offset reset policy for new consumer groups
    auto_offset_reset: String,
    /// Partitions for topics created by `declare_topology`
    partitions: i32,
    /// Replication factor for topics created by `declare_topology`
    replication_factor: i32,
}

impl RedpandaEventBus {
    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Exchange this bus publishes to.
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Kafka topic carrying `routing_key` on this exchange.
    #[must_use]
    pub fn topic_name(&self, routing_key: &str) -> String {
        topic_name(&self.exchange, routing_key)
    }

    /// Ask the broker for cluster metadata, proving it is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if no broker answered within the timeout.
    pub async fn probe(&self) -> Result<(), EventBusError> {
        let producer = self.producer.clone();
        let timeout = self.timeout;
        let metadata = tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(None, timeout)
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .map_err(|e| EventBusError::ConnectionFailed(format!("metadata probe aborted: {e}")))?;

        match metadata {
            Ok(brokers) => {
                tracing::debug!(brokers, "Broker metadata probe succeeded");
                Ok(())
            },
            Err(e) => Err(EventBusError::ConnectionFailed(format!(
                "broker metadata unavailable: {e}"
            ))),
        }
    }
}

/// Kafka topic for a routing key on an exchange.
#[must_use]
pub fn topic_name(exchange: &str, routing_key: &str) -> String {
    format!("{exchange}.{routing_key}")
}

/// Kafka subscription entries for a topology: plain topic names for exact
/// bindings, `^`-prefixed regexes for wildcard bindings.
#[must_use]
pub fn subscription_patterns(topology: &Topology) -> Vec<String> {
    let mut patterns: Vec<String> = topology
        .routing_keys
        .iter()
        .map(|key| {
            if is_wildcard(key) {
                binding_regex(&topology.exchange, key)
            } else {
                topic_name(&topology.exchange, key)
            }
        })
        .collect();
    patterns.sort();
    patterns.dedup();
    patterns
}

/// Builder for configuring a [`RedpandaEventBus`].
///
/// # Example
///
/// ```no_run
/// use fulfillment_redpanda::RedpandaEventBus;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .exchange("events")
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    exchange: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    auto_offset_reset: Option<String>,
    partitions: Option<i32>,
    replication_factor: Option<i32>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated, e.g. `"localhost:9092"`).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the exchange (topic prefix). Default: `events`
    #[must_use]
    pub fn exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1" or "all".
    ///
    /// Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the metadata, delivery and seek timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the auto offset reset policy for new consumer groups.
    ///
    /// Default: "earliest"
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Partition count and replication factor for topics created by
    /// [`EventBus::declare_topology`]. Default: 1 and 1
    #[must_use]
    pub const fn topic_layout(mut self, partitions: i32, replication_factor: i32) -> Self {
        self.partitions = Some(partitions);
        self.replication_factor = Some(replication_factor);
        self
    }

    /// Build the [`RedpandaEventBus`] without contacting the broker.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer or admin client
    /// - Invalid configuration
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self.brokers.ok_or_else(|| {
            EventBusError::ConnectionFailed("Brokers not configured".to_string())
        })?;
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));
        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression);

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
        })?;

        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create admin client: {e}"))
            })?;

        let exchange = self.exchange.unwrap_or_else(|| "events".to_string());
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "earliest".to_string());

        tracing::info!(
            brokers = %brokers,
            exchange = %exchange,
            acks,
            compression,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventBus created"
        );

        Ok(RedpandaEventBus {
            producer,
            admin,
            brokers,
            exchange,
            timeout,
            auto_offset_reset,
            partitions: self.partitions.unwrap_or(1),
            replication_factor: self.replication_factor.unwrap_or(1),
        })
    }

    /// Build the bus and verify the broker answers a metadata request.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the clients cannot be
    /// created or no broker is reachable.
    pub async fn connect(self) -> Result<RedpandaEventBus, EventBusError> {
        let bus = self.build()?;
        bus.probe().await?;
        tracing::info!(brokers = %bus.brokers, "Connected to broker");
        Ok(bus)
    }
}

impl EventBus for RedpandaEventBus {
    fn declare_topology<'a>(&'a self, topology: &'a Topology) -> BusFuture<'a, ()> {
        Box::pin(async move {
            let topics: Vec<String> = topology
                .routing_keys
                .iter()
                .filter(|key| !is_wildcard(key))
                .map(|key| topic_name(&topology.exchange, key))
                .collect();

            if !topics.is_empty() {
                let new_topics: Vec<NewTopic<'_>> = topics
                    .iter()
                    .map(|topic| {
                        NewTopic::new(
                            topic,
                            self.partitions,
                            TopicReplication::Fixed(self.replication_factor),
                        )
                    })
                    .collect();

                let results = self
                    .admin
                    .create_topics(&new_topics, &AdminOptions::new())
                    .await
                    .map_err(|e| EventBusError::TopologyFailed {
                        queue: topology.queue.clone(),
                        reason: e.to_string(),
                    })?;

                for result in results {
                    match result {
                        Ok(topic) => tracing::info!(topic = %topic, "Topic created"),
                        Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                            tracing::debug!(topic = %topic, "Topic already exists");
                        },
                        Err((topic, code)) => {
                            return Err(EventBusError::TopologyFailed {
                                queue: topology.queue.clone(),
                                reason: format!("topic {topic}: {code}"),
                            });
                        },
                    }
                }
            }

            tracing::info!(
                exchange = %topology.exchange,
                queue = %topology.queue,
                bindings = ?topology.routing_keys,
                "Topology declared"
            );
            Ok(())
        })
    }

    fn publish<'a>(&'a self, routing_key: &'a str, payload: &'a [u8]) -> BusFuture<'a, ()> {
        Box::pin(async move {
            let topic = self.topic_name(routing_key);
            let record = FutureRecord::to(&topic).payload(payload).key(routing_key);

            let delivery = self.producer.send_result(record).map_err(|(kafka_error, _)| {
                tracing::error!(
                    topic = %topic,
                    error = %kafka_error,
                    "Failed to enqueue message"
                );
                EventBusError::PublishFailed {
                    routing_key: routing_key.to_string(),
                    reason: kafka_error.to_string(),
                }
            })?;

            // Fire-and-forget: the delivery report is only observed.
            tokio::spawn(async move {
                match delivery.await {
                    Ok(Ok((partition, offset))) => {
                        tracing::debug!(topic = %topic, partition, offset, "Message delivered");
                    },
                    Ok(Err((kafka_error, _))) => {
                        metrics::counter!("broker.delivery_failed").increment(1);
                        tracing::warn!(topic = %topic, error = %kafka_error, "Message delivery failed");
                    },
                    Err(_canceled) => {
                        tracing::warn!(topic = %topic, "Producer dropped before delivery report");
                    },
                }
            });
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, topology: &'a Topology) -> BusFuture<'a, MessageStream> {
        let brokers = self.brokers.clone();
        let auto_offset_reset = self.auto_offset_reset.clone();
        let timeout = self.timeout;
        let prefix = format!("{}.", topology.exchange);
        let queue = topology.queue.clone();
        let patterns = subscription_patterns(topology);

        Box::pin(async move {
            let subscription_failed = |reason: String| EventBusError::SubscriptionFailed {
                queue: queue.clone(),
                reason,
            };

            if patterns.is_empty() {
                return Err(subscription_failed("queue has no bindings".to_string()));
            }

            // Queue name is the consumer group: committed offsets make it durable.
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &queue)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| subscription_failed(format!("Failed to create consumer: {e}")))?;

            let pattern_refs: Vec<&str> = patterns.iter().map(String::as_str).collect();
            consumer
                .subscribe(&pattern_refs)
                .map_err(|e| subscription_failed(format!("Failed to subscribe: {e}")))?;

            tracing::info!(
                queue = %queue,
                subscriptions = ?patterns,
                auto_offset_reset = %auto_offset_reset,
                manual_commit = true,
                "Subscribed to queue"
            );

            // Capacity 1: the consumer task waits for settlement before the next recv.
            let (tx, rx) = tokio::sync::mpsc::channel(1);
            tokio::spawn(consume(consumer, prefix, timeout, tx));

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as MessageStream)
        })
    }
}

/// Owns the consumer: hands out one message, waits for its settlement, then
/// commits or seeks back before receiving the next one.
async fn consume(
    consumer: StreamConsumer,
    prefix: String,
    timeout: Duration,
    tx: tokio::sync::mpsc::Sender<Result<IncomingMessage, EventBusError>>,
) {
    // Delivery counts for messages that were requeued, keyed by position.
    let mut attempts: HashMap<(String, i32, i64), u32> = HashMap::new();

    loop {
        let received = match consumer.recv().await {
            Ok(message) => {
                let topic = message.topic().to_string();
                let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
                (topic, message.partition(), message.offset(), payload)
            },
            Err(e) => {
                let err = EventBusError::TransportError(format!("Failed to receive message: {e}"));
                if tx.send(Err(err)).await.is_err() {
                    break;
                }
                continue;
            },
        };
        let (topic, partition, offset, payload) = received;

        let routing_key = topic.strip_prefix(&prefix).unwrap_or(&topic).to_string();
        let position = (topic.clone(), partition, offset);
        let attempt = attempts.get(&position).copied().unwrap_or(0) + 1;

        tracing::trace!(topic = %topic, partition, offset, attempt, "Received message");

        let (message, settled) = IncomingMessage::new(routing_key, payload, attempt);
        if tx.send(Ok(message)).await.is_err() {
            tracing::debug!("Subscriber dropped, exiting consumer task without committing");
            break;
        }

        match disposition_or_requeue(settled.await) {
            Disposition::Ack => {
                attempts.remove(&position);
                let mut offsets = TopicPartitionList::new();
                let commit = offsets
                    .add_partition_offset(&topic, partition, Offset::Offset(offset + 1))
                    .and_then(|()| consumer.commit(&offsets, CommitMode::Async));
                if let Err(e) = commit {
                    tracing::warn!(
                        topic = %topic,
                        partition,
                        offset,
                        error = %e,
                        "Failed to commit offset (message may be redelivered)"
                    );
                }
            },
            Disposition::Requeue { delay } => {
                attempts.insert(position, attempt);
                tokio::time::sleep(delay).await;
                if let Err(e) = consumer.seek(&topic, partition, Offset::Offset(offset), timeout) {
                    // Without the seek the message is skipped until the next rebalance.
                    tracing::error!(
                        topic = %topic,
                        partition,
                        offset,
                        error = %e,
                        "Failed to seek back for redelivery"
                    );
                }
            },
        }
    }

    tracing::debug!("Consumer task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }

    #[test]
    fn build_without_brokers_fails() {
        let result = RedpandaEventBus::builder().build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));
    }

    #[test]
    fn routing_key_maps_to_prefixed_topic() {
        assert_eq!(topic_name("events", "order.created"), "events.order.created");
    }

    #[test]
    fn wildcard_bindings_become_regex_subscriptions() {
        let topology = Topology::new("events", "notification-service")
            .bind("order.created")
            .bind("delivery.*")
            .bind("order.created");
        assert_eq!(
            subscription_patterns(&topology),
            vec![
                r"^events\.delivery\.[^.]+$".to_string(),
                "events.order.created".to_string(),
            ]
        );
    }
}
