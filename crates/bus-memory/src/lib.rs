//! In-memory, partitioned implementation of the bus interface.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod subscription;
mod topic_log;

pub use error::Error;
pub use subscription::MemorySubscription;

use subscription::{GroupKey, GroupLease, OffsetKey, PartitionConsumer};
use topic_log::{PartitionLog, TopicLog};

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};
use txflow_bus::{Bus, BusMessage, MessageHandler};

const CREATED: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

/// Options for the in-memory bus.
#[derive(Clone, Debug)]
pub struct MemoryBusOptions {
    /// Number of partitions every topic is created with.
    pub partitions: u32,

    /// Upper bound on a single publish.
    pub publish_timeout: Duration,

    /// Whether new consumer groups start at the beginning of the log instead
    /// of its end.
    pub start_from_beginning: bool,
}

impl Default for MemoryBusOptions {
    fn default() -> Self {
        Self {
            partitions: 3,
            publish_timeout: Duration::from_secs(5),
            start_from_beginning: false,
        }
    }
}

/// Fault injected into publishes to a topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishFault {
    /// Fail immediately with [`Error::Rejected`].
    Reject,

    /// Never complete, so the publish runs into its timeout.
    Stall,
}

#[derive(Clone, Copy, Debug)]
struct FaultPlan {
    fault: PublishFault,
    remaining_successes: usize,
}

#[derive(Debug)]
struct Inner {
    active_groups: Arc<DashSet<GroupKey>>,
    faults: DashMap<String, FaultPlan>,
    lifecycle: RwLock<()>,
    next_unkeyed_partition: AtomicU32,
    offsets: Arc<DashMap<OffsetKey, u64>>,
    options: MemoryBusOptions,
    publish_tracker: TaskTracker,
    consumer_tracker: TaskTracker,
    shutdown_token: CancellationToken,
    state: AtomicU8,
    topics: DashMap<String, Arc<TopicLog>>,
}

/// An in-process bus with Kafka-like semantics.
///
/// Each topic is split into a fixed number of append-only partitions. Keys
/// are hashed onto partitions, every consumer group tracks its own offset per
/// partition, and each partition of a subscription is consumed by its own
/// task.
#[derive(Clone, Debug)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

impl MemoryBus {
    /// Creates a new bus. It must be opened before use.
    #[must_use]
    pub fn new(options: MemoryBusOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                active_groups: Arc::new(DashSet::new()),
                faults: DashMap::new(),
                lifecycle: RwLock::new(()),
                next_unkeyed_partition: AtomicU32::new(0),
                offsets: Arc::new(DashMap::new()),
                options,
                publish_tracker: TaskTracker::new(),
                consumer_tracker: TaskTracker::new(),
                shutdown_token: CancellationToken::new(),
                state: AtomicU8::new(CREATED),
                topics: DashMap::new(),
            }),
        }
    }

    /// Makes every publish to `topic` fail with `fault`.
    pub fn inject_publish_fault(&self, topic: &str, fault: PublishFault) {
        self.fail_publishes_after(topic, 0, fault);
    }

    /// Lets `successes` publishes to `topic` through, then fails every
    /// following one with `fault`.
    pub fn fail_publishes_after(&self, topic: &str, successes: usize, fault: PublishFault) {
        self.inner.faults.insert(
            topic.to_string(),
            FaultPlan {
                fault,
                remaining_successes: successes,
            },
        );
    }

    /// Removes any fault injected for `topic`.
    pub fn clear_publish_fault(&self, topic: &str) {
        self.inner.faults.remove(topic);
    }

    /// Every message appended to `topic`, partition by partition in offset
    /// order.
    pub async fn messages(&self, topic: &str) -> Vec<BusMessage> {
        let log = self.inner.topics.get(topic).map(|entry| Arc::clone(entry.value()));
        match log {
            Some(log) => log.messages().await,
            None => Vec::new(),
        }
    }

    fn ensure_open(&self) -> Result<(), Error> {
        match self.inner.state.load(Ordering::Acquire) {
            OPEN => Ok(()),
            CLOSED => Err(Error::Closed),
            _ => Err(Error::NotOpen),
        }
    }

    fn topic(&self, name: &str) -> Arc<TopicLog> {
        self.inner
            .topics
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(TopicLog::new(
                    name.to_string(),
                    self.inner.options.partitions,
                ))
            })
            .value()
            .clone()
    }

    fn take_fault(&self, topic: &str) -> Option<PublishFault> {
        let mut plan = self.inner.faults.get_mut(topic)?;
        if plan.remaining_successes > 0 {
            plan.remaining_successes -= 1;
            None
        } else {
            Some(plan.fault)
        }
    }

    async fn append(
        log: Arc<TopicLog>,
        key: Option<String>,
        payload: Bytes,
        next_unkeyed_partition: u32,
    ) -> u64 {
        let partition = key
            .as_deref()
            .map_or(next_unkeyed_partition, |key| log.partition_for(key));
        log.append(partition, key.as_deref(), payload).await
    }
}

#[async_trait]
impl Bus for MemoryBus {
    type Error = Error;

    type Subscription = MemorySubscription;

    async fn open(&self) -> Result<(), Self::Error> {
        match self
            .inner
            .state
            .compare_exchange(CREATED, OPEN, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                info!(
                    "memory bus open with {} partitions per topic",
                    self.inner.options.partitions
                );
                Ok(())
            }
            Err(OPEN) => Ok(()),
            Err(_) => Err(Error::Closed),
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        {
            // Publishes register with the tracker under the read side.
            let _lifecycle = self.inner.lifecycle.write().await;
            self.inner
                .state
                .compare_exchange(OPEN, CLOSED, Ordering::AcqRel, Ordering::Acquire)
                .map_err(|state| {
                    if state == CREATED {
                        Error::NotOpen
                    } else {
                        Error::Closed
                    }
                })?;
        }

        self.inner.publish_tracker.close();
        self.inner.publish_tracker.wait().await;

        self.inner.shutdown_token.cancel();
        self.inner.consumer_tracker.close();
        self.inner.consumer_tracker.wait().await;

        info!("memory bus closed");

        Ok(())
    }

    async fn publish_bytes(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Bytes,
    ) -> Result<(), Self::Error> {
        let in_flight = {
            let _lifecycle = self.inner.lifecycle.read().await;
            self.ensure_open()?;
            self.inner.publish_tracker.token()
        };

        let fault = self.take_fault(topic);
        if fault == Some(PublishFault::Reject) {
            return Err(Error::Rejected(topic.to_string()));
        }

        let log = self.topic(topic);
        let next_unkeyed_partition = self
            .inner
            .next_unkeyed_partition
            .fetch_add(1, Ordering::Relaxed)
            % log.partition_count();
        let key = key.map(ToString::to_string);

        let append = async move {
            if fault == Some(PublishFault::Stall) {
                std::future::pending::<()>().await;
            }
            Self::append(log, key, payload, next_unkeyed_partition).await
        };

        let offset = tokio::time::timeout(self.inner.options.publish_timeout, append)
            .await
            .map_err(|_| Error::Timeout(topic.to_string()))?;
        drop(in_flight);

        debug!("published to {topic}@{offset}");

        Ok(())
    }

    async fn subscribe<H>(
        &self,
        topic: &str,
        consumer_group: &str,
        handler: H,
    ) -> Result<Self::Subscription, Self::Error>
    where
        H: MessageHandler,
    {
        self.ensure_open()?;

        if !self
            .inner
            .active_groups
            .insert((topic.to_string(), consumer_group.to_string()))
        {
            return Err(Error::GroupAlreadySubscribed {
                topic: topic.to_string(),
                group: consumer_group.to_string(),
            });
        }

        // Released once every partition task below has exited.
        let lease = Arc::new(GroupLease::new(
            (topic.to_string(), consumer_group.to_string()),
            self.inner.active_groups.clone(),
        ));

        let log = self.topic(topic);
        let subscription = MemorySubscription::new(
            topic.to_string(),
            consumer_group.to_string(),
            self.inner.shutdown_token.child_token(),
        );

        for partition in 0..log.partition_count() {
            let start = if self.inner.options.start_from_beginning {
                0
            } else {
                log.partition(partition).map_or(0, PartitionLog::len)
            };

            self.inner
                .offsets
                .entry((topic.to_string(), consumer_group.to_string(), partition))
                .or_insert(start);

            subscription.spawn_partition_consumer(
                PartitionConsumer {
                    consumer_group: consumer_group.to_string(),
                    handler: handler.clone(),
                    _lease: lease.clone(),
                    log: log.clone(),
                    offsets: self.inner.offsets.clone(),
                    partition,
                    topic: topic.to_string(),
                },
                &self.inner.consumer_tracker,
            );
        }

        info!(
            "consumer group {consumer_group} subscribed to {topic} ({} partitions)",
            log.partition_count()
        );

        Ok(subscription)
    }
}
