use bytes::Bytes;
use tokio::sync::{RwLock, watch};
use txflow_bus::BusMessage;
use txflow_envelope::now_millis;

/// The partitions of a single topic.
#[derive(Debug)]
pub struct TopicLog {
    name: String,
    partitions: Vec<PartitionLog>,
}

impl TopicLog {
    pub fn new(name: String, partitions: u32) -> Self {
        Self {
            name,
            partitions: (0..partitions.max(1)).map(|_| PartitionLog::new()).collect(),
        }
    }

    pub fn partition_count(&self) -> u32 {
        u32::try_from(self.partitions.len()).unwrap_or(u32::MAX)
    }

    pub fn partition(&self, index: u32) -> Option<&PartitionLog> {
        self.partitions.get(index as usize)
    }

    /// Picks the partition for a key: CRC32 of the key modulo the partition count.
    pub fn partition_for(&self, key: &str) -> u32 {
        crc32fast::hash(key.as_bytes()) % self.partition_count()
    }

    pub async fn append(&self, partition: u32, key: Option<&str>, payload: Bytes) -> u64 {
        let index = partition % self.partition_count();
        self.partitions[index as usize]
            .append(&self.name, index, key, payload)
            .await
    }

    pub async fn messages(&self) -> Vec<BusMessage> {
        let mut messages = Vec::new();
        for partition in &self.partitions {
            messages.extend(partition.log.read().await.iter().cloned());
        }
        messages
    }
}

/// An append-only log with a watchable length.
#[derive(Debug)]
pub struct PartitionLog {
    log: RwLock<Vec<BusMessage>>,
    length: watch::Sender<u64>,
}

impl PartitionLog {
    fn new() -> Self {
        Self {
            log: RwLock::new(Vec::new()),
            length: watch::Sender::new(0),
        }
    }

    async fn append(&self, topic: &str, partition: u32, key: Option<&str>, payload: Bytes) -> u64 {
        let mut log = self.log.write().await;
        let offset = log.len() as u64;
        log.push(BusMessage {
            topic: topic.to_string(),
            partition,
            offset,
            key: key.map(ToString::to_string),
            payload,
            timestamp: now_millis(),
        });
        self.length.send_replace(offset + 1);
        offset
    }

    pub fn len(&self) -> u64 {
        *self.length.borrow()
    }

    pub fn watch_length(&self) -> watch::Receiver<u64> {
        self.length.subscribe()
    }

    /// Messages from `offset` to the current end of the log.
    pub async fn read_from(&self, offset: u64) -> Vec<BusMessage> {
        let log = self.log.read().await;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(log.len());
        log[start..].to_vec()
    }
}
