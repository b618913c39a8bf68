//! Vector-index consumer
//!
//! Resolves a queue message to its staged batch, deletes the blob once read,
//! embeds upserted events and applies bulk deletes and upserts to the index.
//! Any embedding or index failure is returned so the delivery stays unacked
//! and is redelivered; index writes are keyed and therefore repeatable.

use std::collections::HashMap;
use std::sync::Arc;

use calsync_domain::{
    CalSyncError, ChangeMethod, IndexRecord, QueueMessage, Result, StagedBatch,
    VectorChangeObject,
};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, instrument, warn};

use super::normalize::normalize_instant;
use super::ports::{BlobStore, Delivery, EmbeddingService, VectorIndex};

const DEFAULT_EMBED_CONCURRENCY: usize = 4;

/// What one message changed in the index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeReport {
    pub deleted: usize,
    pub upserted: usize,
    /// Upserts without an id, text, or parseable start/end.
    pub skipped: usize,
}

pub struct VectorIndexConsumer {
    blobs: Arc<dyn BlobStore>,
    embeddings: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
    embed_concurrency: usize,
}

impl VectorIndexConsumer {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        embeddings: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self { blobs, embeddings, index, embed_concurrency: DEFAULT_EMBED_CONCURRENCY }
    }

    pub fn with_embed_concurrency(mut self, concurrency: usize) -> Self {
        self.embed_concurrency = concurrency.max(1);
        self
    }

    /// Decode a broker delivery and process it.
    pub async fn on_delivery(&self, delivery: &Delivery) -> Result<ConsumeReport> {
        let message: QueueMessage = serde_json::from_slice(&delivery.payload)?;
        self.on_message(&message).await
    }

    #[instrument(skip(self, message), fields(staged_batch = %message.staged_batch_ref))]
    pub async fn on_message(&self, message: &QueueMessage) -> Result<ConsumeReport> {
        let batch = self.take_batch(&message.staged_batch_ref).await?;
        let (deletes, upserts) = partition_changes(&batch.events);
        debug!(deletes = deletes.len(), upserts = upserts.len(), "staged batch loaded");

        let mut report = ConsumeReport::default();
        if !deletes.is_empty() {
            self.index.bulk_delete(&deletes).await?;
            report.deleted = deletes.len();
        }

        let records = self.build_records(&batch.user_id, &upserts, &mut report).await?;
        if !records.is_empty() {
            self.index.bulk_upsert(&records).await?;
            report.upserted = records.len();
        }

        info!(
            user_id = %batch.user_id,
            deleted = report.deleted,
            upserted = report.upserted,
            skipped = report.skipped,
            "vector index updated"
        );
        Ok(report)
    }

    /// Fetch the staged batch and delete its blob.
    async fn take_batch(&self, key: &str) -> Result<StagedBatch> {
        let bytes = self.blobs.get(key).await?;
        if let Err(err) = self.blobs.delete(key).await {
            warn!(staged_batch = %key, error = %err, "failed to delete staged batch");
        }
        serde_json::from_slice(&bytes).map_err(|err| {
            CalSyncError::Serialization(format!("staged batch {key} is not valid: {err}"))
        })
    }

    async fn build_records(
        &self,
        user_id: &str,
        upserts: &[(String, &VectorChangeObject)],
        report: &mut ConsumeReport,
    ) -> Result<Vec<IndexRecord>> {
        let mut pending = Vec::with_capacity(upserts.len());
        for (id, change) in upserts {
            let event = &change.event;
            let text = event.embedding_text();
            let fallback = event.timezone();
            let start = normalize_instant(&event.start, fallback);
            let end = normalize_instant(&event.end, fallback);
            match (text.is_empty(), start, end) {
                (false, Some(start_date), Some(end_date)) => {
                    pending.push((id.clone(), text, start_date, end_date));
                }
                _ => {
                    debug!(id = %id, "skipping event without text or valid start/end");
                    report.skipped += 1;
                }
            }
        }

        stream::iter(pending)
            .map(|(id, raw_text, start_date, end_date)| async move {
                let vector = self.embeddings.embed(&raw_text).await?;
                Ok::<_, CalSyncError>(IndexRecord {
                    id,
                    user_id: user_id.to_string(),
                    vector,
                    start_date,
                    end_date,
                    raw_text,
                })
            })
            .buffered(self.embed_concurrency)
            .try_collect()
            .await
    }
}

/// Split a batch into delete ids and upserts, keeping the last change per key.
fn partition_changes(
    events: &[VectorChangeObject],
) -> (Vec<String>, Vec<(String, &VectorChangeObject)>) {
    let mut latest: HashMap<String, usize> = HashMap::new();
    let mut order = Vec::new();
    for (position, change) in events.iter().enumerate() {
        let Some(key) = change.index_key() else {
            continue;
        };
        if latest.insert(key.clone(), position).is_none() {
            order.push(key);
        }
    }

    let mut deletes = Vec::new();
    let mut upserts = Vec::new();
    for key in order {
        let change = &events[latest[&key]];
        match change.method {
            ChangeMethod::Delete => deletes.push(key),
            ChangeMethod::Upsert => upserts.push((key, change)),
        }
    }
    (deletes, upserts)
}
