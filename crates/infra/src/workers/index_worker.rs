//! Vector-index consumer worker.
//!
//! Polls the vector topic one message at a time and hands each delivery to a
//! [`VectorIndexConsumer`]. A delivery is acknowledged only after the index
//! accepted it, or when it can never succeed (its staged batch is gone or the
//! payload is not a queue message). Anything else stays pending and is
//! redelivered after the poll interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use calsync_core::{Delivery, MessageConsumer, VectorIndexConsumer};
use calsync_domain::{CalSyncError, Config, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct VectorIndexWorkerConfig {
    /// Wait between polls when the topic is drained or a delivery failed.
    pub poll_interval: Duration,
    /// Timeout for processing a single delivery
    pub processing_timeout: Duration,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for VectorIndexWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            processing_timeout: Duration::from_secs(300),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl VectorIndexWorkerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.broker.poll_interval_ms.max(1)),
            processing_timeout: Duration::from_secs(config.worker.processing_timeout_secs.max(1)),
            join_timeout: Duration::from_secs(config.worker.join_timeout_secs.max(1)),
        }
    }
}

/// Result of handling one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// A delivery was acknowledged; poll again immediately.
    Acked,
    /// Nothing to do, or the delivery stays pending; wait before polling.
    Wait,
}

pub struct VectorIndexWorker {
    consumer: Arc<dyn MessageConsumer>,
    index_consumer: Arc<VectorIndexConsumer>,
    config: VectorIndexWorkerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl VectorIndexWorker {
    pub fn new(
        consumer: Arc<dyn MessageConsumer>,
        index_consumer: Arc<VectorIndexConsumer>,
        config: VectorIndexWorkerConfig,
    ) -> Self {
        Self {
            consumer,
            index_consumer,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Start the worker, spawning the background processing task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(CalSyncError::InvalidInput("vector index worker already running".into()));
        }

        self.cancellation = CancellationToken::new();
        let consumer = Arc::clone(&self.consumer);
        let index_consumer = Arc::clone(&self.index_consumer);
        let config = self.config.clone();
        let cancel = self.cancellation.clone();

        self.task_handle = Some(tokio::spawn(async move {
            Self::process_loop(consumer, index_consumer, config, cancel).await;
        }));
        info!("vector index worker started");
        Ok(())
    }

    /// Stop the worker and wait for the processing task to finish. A delivery
    /// interrupted mid-flight stays pending.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.task_handle.take() else {
            return Err(CalSyncError::InvalidInput("vector index worker not running".into()));
        };

        self.cancellation.cancel();
        match tokio::time::timeout(self.config.join_timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(error = %err, "vector index worker task panicked");
                return Err(CalSyncError::Internal(format!("worker task panicked: {err}")));
            }
            Err(_) => {
                warn!("vector index worker did not stop within timeout");
                return Err(CalSyncError::Internal("worker task join timed out".into()));
            }
        }

        info!("vector index worker stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    async fn process_loop(
        consumer: Arc<dyn MessageConsumer>,
        index_consumer: Arc<VectorIndexConsumer>,
        config: VectorIndexWorkerConfig,
        cancel: CancellationToken,
    ) {
        loop {
            let poll =
                Self::poll_once(consumer.as_ref(), &index_consumer, config.processing_timeout);
            let step = tokio::select! {
                _ = cancel.cancelled() => break,
                step = poll => step,
            };
            if step == Step::Acked {
                continue;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(config.poll_interval) => {}
            }
        }
        debug!("vector index worker loop exited");
    }

    async fn poll_once(
        consumer: &dyn MessageConsumer,
        index_consumer: &VectorIndexConsumer,
        processing_timeout: Duration,
    ) -> Step {
        let delivery = match consumer.poll().await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => return Step::Wait,
            Err(err) => {
                error!(error = %err, "polling the vector topic failed");
                return Step::Wait;
            }
        };

        let started = Instant::now();
        let ack = match tokio::time::timeout(
            processing_timeout,
            index_consumer.on_delivery(&delivery),
        )
        .await
        {
            Ok(Ok(report)) => {
                debug!(
                    partition = delivery.partition,
                    offset = delivery.offset,
                    upserted = report.upserted,
                    deleted = report.deleted,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "delivery processed"
                );
                true
            }
            Ok(Err(err)) => settle_failure(&delivery, &err),
            Err(_) => {
                warn!(
                    partition = delivery.partition,
                    offset = delivery.offset,
                    timeout_secs = processing_timeout.as_secs(),
                    "delivery processing timed out"
                );
                false
            }
        };

        if !ack {
            return Step::Wait;
        }
        match consumer.ack(&delivery).await {
            Ok(()) => Step::Acked,
            Err(err) => {
                error!(offset = delivery.offset, error = %err, "ack failed");
                Step::Wait
            }
        }
    }
}

/// Whether a failed delivery should be acknowledged anyway.
fn settle_failure(delivery: &Delivery, err: &CalSyncError) -> bool {
    match err {
        // The blob is removed before indexing, so a retry after a failed
        // embedding lands here with its batch gone.
        CalSyncError::NotFound(_) => {
            error!(
                partition = delivery.partition,
                offset = delivery.offset,
                error = %err,
                "staged batch unavailable, possibly dropped after an earlier failed attempt; \
                 acknowledging"
            );
            true
        }
        CalSyncError::Serialization(_) => {
            error!(offset = delivery.offset, error = %err, "undecodable delivery dropped");
            true
        }
        _ => {
            error!(
                partition = delivery.partition,
                offset = delivery.offset,
                error = %err,
                kind = err.label(),
                "delivery failed; left pending"
            );
            false
        }
    }
}

impl Drop for VectorIndexWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("VectorIndexWorker dropped while running; cancelling task");
            self.cancellation.cancel();
        }
    }
}
