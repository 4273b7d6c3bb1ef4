use crate::topic_log::{PartitionLog, TopicLog};

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};
use txflow_bus::{MessageHandler, Subscription};

pub type GroupKey = (String, String);
pub type OffsetKey = (String, String, u32);

/// Marks a consumer group as live on a topic until the last partition task
/// holding it exits.
#[derive(Debug)]
pub struct GroupLease {
    key: GroupKey,
    active_groups: Arc<DashSet<GroupKey>>,
}

impl GroupLease {
    pub fn new(key: GroupKey, active_groups: Arc<DashSet<GroupKey>>) -> Self {
        Self { key, active_groups }
    }
}

impl Drop for GroupLease {
    fn drop(&mut self) {
        self.active_groups.remove(&self.key);
    }
}

/// A live consumer group subscription on the in-memory bus.
///
/// Dropping it stops delivery, but the group stays taken until the handler
/// returns from the message it is processing.
#[derive(Debug)]
pub struct MemorySubscription {
    topic: String,
    consumer_group: String,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl MemorySubscription {
    pub(crate) fn new(
        topic: String,
        consumer_group: String,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            topic,
            consumer_group,
            shutdown_token,
            task_tracker: TaskTracker::new(),
        }
    }

    pub(crate) fn spawn_partition_consumer<H>(
        &self,
        consumer: PartitionConsumer<H>,
        bus_tracker: &TaskTracker,
    ) where
        H: MessageHandler,
    {
        let token = self.shutdown_token.clone();
        self.task_tracker
            .spawn(bus_tracker.track_future(consumer.run(token)));
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    async fn shutdown(&self) {
        self.shutdown_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

/// Delivers one partition to one handler, one message at a time.
pub struct PartitionConsumer<H> {
    pub consumer_group: String,
    pub handler: H,
    pub _lease: Arc<GroupLease>,
    pub log: Arc<TopicLog>,
    pub offsets: Arc<DashMap<OffsetKey, u64>>,
    pub partition: u32,
    pub topic: String,
}

impl<H> PartitionConsumer<H>
where
    H: MessageHandler,
{
    fn partition_log(&self) -> Option<&PartitionLog> {
        self.log.partition(self.partition)
    }

    fn offset_key(&self) -> OffsetKey {
        (
            self.topic.clone(),
            self.consumer_group.clone(),
            self.partition,
        )
    }

    async fn run(self, shutdown_token: CancellationToken) {
        let Some(partition_log) = self.partition_log() else {
            return;
        };

        let offset_key = self.offset_key();
        let mut length = partition_log.watch_length();

        loop {
            let offset = self.offsets.get(&offset_key).map_or(0, |entry| *entry);

            let has_messages = tokio::select! {
                biased;
                () = shutdown_token.cancelled() => false,
                ready = async { length.wait_for(|len| *len > offset).await.is_ok() } => ready,
            };

            if !has_messages {
                break;
            }

            for message in partition_log.read_from(offset).await {
                if shutdown_token.is_cancelled() {
                    return;
                }

                debug!(
                    "delivering {}[{}]@{} to {}",
                    self.topic, self.partition, message.offset, self.consumer_group
                );

                let delivered_offset = message.offset;
                if let Err(e) = self.handler.handle(message).await {
                    error!(
                        topic = %self.topic,
                        partition = self.partition,
                        offset = delivered_offset,
                        consumer_group = %self.consumer_group,
                        "handler failed: {e}"
                    );
                }

                self.offsets.insert(offset_key.clone(), delivered_offset + 1);
            }
        }
    }
}
