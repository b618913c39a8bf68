//! Transactional enqueue of staged vector-change batches
//!
//! The batch is written to blob storage first, then a reference message is
//! published in a broker transaction that also commits the consumer group's
//! current offsets. A failed transaction is aborted and the staged blob is
//! removed again.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_domain::constants::STAGED_BATCH_EXTENSION;
use calsync_domain::{QueueMessage, Result, StagedBatch, VectorChangeObject};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::ports::{BlobStore, BrokerTransaction, MessageBroker, VectorChangePublisher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueSettings {
    pub topic: String,
    /// Consumer group whose offsets are committed alongside each publish.
    pub group_id: String,
}

pub struct VectorIndexEnqueuer {
    blobs: Arc<dyn BlobStore>,
    broker: Arc<dyn MessageBroker>,
    settings: EnqueueSettings,
}

impl VectorIndexEnqueuer {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        broker: Arc<dyn MessageBroker>,
        settings: EnqueueSettings,
    ) -> Self {
        Self { blobs, broker, settings }
    }

    /// Stage and publish `changes`. Returns the staged key, or `None` when
    /// there was nothing to enqueue.
    #[instrument(skip(self, changes), fields(changes = changes.len()))]
    pub async fn enqueue(
        &self,
        user_id: &str,
        changes: &[VectorChangeObject],
    ) -> Result<Option<String>> {
        if changes.is_empty() {
            debug!("no vector changes to enqueue");
            return Ok(None);
        }

        let key = staged_batch_key(user_id);
        let batch = StagedBatch { user_id: user_id.to_string(), events: changes.to_vec() };
        self.blobs.put(&key, serde_json::to_vec(&batch)?).await?;

        let message = serde_json::to_vec(&QueueMessage { staged_batch_ref: key.clone() })?;
        let mut tx = self.broker.begin_transaction().await?;

        if let Err(err) = self.publish_within(tx.as_mut(), user_id, message).await {
            self.abandon(tx, &key).await;
            return Err(err);
        }
        if let Err(err) = tx.commit().await {
            // commit consumed the transaction; only the blob is left to clean up
            self.remove_orphan(&key).await;
            return Err(err);
        }

        info!(staged_batch = %key, topic = %self.settings.topic, "vector changes enqueued");
        Ok(Some(key))
    }

    async fn publish_within(
        &self,
        tx: &mut dyn BrokerTransaction,
        user_id: &str,
        message: Vec<u8>,
    ) -> Result<()> {
        tx.send(&self.settings.topic, Some(user_id), message).await?;
        let offsets =
            self.broker.committed_offsets(&self.settings.group_id, &self.settings.topic).await?;
        tx.send_offsets(&self.settings.group_id, &self.settings.topic, &offsets).await
    }

    async fn abandon(&self, tx: Box<dyn BrokerTransaction>, key: &str) {
        if let Err(err) = tx.abort().await {
            warn!(error = %err, "failed to abort broker transaction");
        }
        self.remove_orphan(key).await;
    }

    async fn remove_orphan(&self, key: &str) {
        if let Err(err) = self.blobs.delete(key).await {
            warn!(staged_batch = %key, error = %err, "failed to remove orphaned staged batch");
        }
    }
}

#[async_trait]
impl VectorChangePublisher for VectorIndexEnqueuer {
    async fn publish(
        &self,
        user_id: &str,
        changes: &[VectorChangeObject],
    ) -> Result<Option<String>> {
        self.enqueue(user_id, changes).await
    }
}

/// Fresh `"<userId>/<uuid>.json"` blob key.
pub fn staged_batch_key(user_id: &str) -> String {
    format!("{user_id}/{}.{STAGED_BATCH_EXTENSION}", Uuid::new_v4())
}
