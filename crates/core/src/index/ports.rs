//! Port interfaces for vector index propagation

use async_trait::async_trait;
use calsync_domain::{IndexRecord, Result, SearchHit, VectorChangeObject, VectorQuery};

/// Object storage for staged batches
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Fails with `NotFound` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Committed read position of a consumer group on one partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionOffset {
    pub partition: u32,
    pub offset: i64,
}

/// Producer side of the broker
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Current committed offsets of `group_id` on `topic`.
    async fn committed_offsets(&self, group_id: &str, topic: &str) -> Result<Vec<PartitionOffset>>;

    async fn begin_transaction(&self) -> Result<Box<dyn BrokerTransaction>>;
}

/// Writes made through a transaction become visible together on commit and
/// not at all on abort.
#[async_trait]
pub trait BrokerTransaction: Send {
    async fn send(&mut self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> Result<()>;

    async fn send_offsets(
        &mut self,
        group_id: &str,
        topic: &str,
        offsets: &[PartitionOffset],
    ) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn abort(self: Box<Self>) -> Result<()>;
}

/// A message handed to a consumer; stays pending until acknowledged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: u32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// Consumer side of the broker: one message at a time, manual ack
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    async fn poll(&self) -> Result<Option<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> Result<()>;
}

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Vector/text index keyed by `IndexRecord::id`
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace records by id.
    async fn bulk_upsert(&self, records: &[IndexRecord]) -> Result<()>;

    /// Delete records by id; missing ids are not an error.
    async fn bulk_delete(&self, ids: &[String]) -> Result<()>;

    async fn search(&self, query: &VectorQuery) -> Result<Vec<SearchHit>>;
}

/// Receives the vector changes accumulated over one sync run.
#[async_trait]
pub trait VectorChangePublisher: Send + Sync {
    /// Returns the staged batch key, or `None` when there was nothing to
    /// publish.
    async fn publish(&self, user_id: &str, changes: &[VectorChangeObject])
        -> Result<Option<String>>;
}
