//! Partition-keyed event hand-off to the broker.
//!
//! Redis streams stand in for topic partitions: a topic `t` with `n`
//! partitions is the set of streams `t:0` .. `t:{n-1}`, and every message for
//! one key lands on the same stream so per-recipient order holds.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), anyhow::Error>;
}

/// Stable partition for `key` among `partitions`.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % u64::from(partitions.max(1))) as u32
}

/// Stream that carries `key` within `topic`: `{topic}:{partition}`.
pub fn stream_name(topic: &str, key: &str, partitions: u32) -> String {
    format!("{}:{}", topic, partition_for(key, partitions))
}

#[derive(Clone)]
pub struct RedisStreamPublisher {
    manager: ConnectionManager,
    partitions: u32,
}

impl RedisStreamPublisher {
    pub fn new(manager: ConnectionManager, partitions: u32) -> Self {
        Self {
            manager,
            partitions: partitions.max(1),
        }
    }
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    #[tracing::instrument(skip(self, payload))]
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), anyhow::Error> {
        let stream = stream_name(topic, key, self.partitions);
        let mut conn = self.manager.clone();

        let entry_id: String = redis::cmd("XADD")
            .arg(&stream)
            .arg("*")
            .arg("key")
            .arg(key)
            .arg("payload")
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to publish to {}: {}", stream, e))?;

        tracing::debug!(stream = %stream, entry_id = %entry_id, "Event published");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

/// Records published events; `set_failing(true)` simulates a broker outage.
#[derive(Default)]
pub struct MockPublisher {
    events: Mutex<Vec<PublishedEvent>>,
    failing: AtomicBool,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventPublisher for MockPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), anyhow::Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Broker unavailable"));
        }
        self.events
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock publisher poisoned: {}", e))?
            .push(PublishedEvent {
                topic: topic.to_string(),
                key: key.to_string(),
                payload: payload.to_string(),
            });
        Ok(())
    }
}
