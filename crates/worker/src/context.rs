//! Worker context - dependency injection container

use std::sync::Arc;
use std::time::Duration;

use calsync_core::{
    EnqueueSettings, OrchestratorSettings, SyncOrchestrator, VectorIndexConsumer,
    VectorIndexEnqueuer,
};
use calsync_domain::{CalSyncError, Config, Result};
use calsync_infra::scheduling::SyncSchedulerConfig;
use calsync_infra::{
    sqlite_record_store, CalendarSyncPool, DbManager, FileBlobStore, GoogleCalendarGateway,
    GoogleTokenSource, HttpClient, OpenAIEmbeddings, OpenSearchIndex, SqliteBroker,
    SyncScheduler, VectorIndexWorker, VectorIndexWorkerConfig, ZoomDeprovisioner,
};
use tracing::info;

/// Everything the worker process runs.
pub struct WorkerContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub index_worker: VectorIndexWorker,
    pub sync_scheduler: Option<SyncScheduler>,
}

impl WorkerContext {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db = Arc::new(DbManager::from_config(&config.database)?);
        db.run_migrations()?;
        info!(path = %db.path().display(), "database ready");

        let store = sqlite_record_store(Arc::clone(&db));
        let blobs = Arc::new(FileBlobStore::from_config(&config.blob));
        let broker = Arc::new(SqliteBroker::new(Arc::clone(&db), config.broker.partitions));

        // provider calls surface failures to the caller instead of retrying
        let provider_http = HttpClient::builder().max_attempts(1).build()?;
        let http = HttpClient::new()?;

        let tokens = Arc::new(GoogleTokenSource::new(
            Arc::clone(&store.integrations),
            provider_http.clone(),
            &config.google,
        ));
        let gateway =
            Arc::new(GoogleCalendarGateway::new(provider_http.clone(), tokens, &config.google)?);
        let deprovisioner = Arc::new(ZoomDeprovisioner::new(
            provider_http,
            Arc::clone(&store.integrations),
            &config.zoom,
        ));
        let enqueuer = Arc::new(VectorIndexEnqueuer::new(
            blobs.clone(),
            broker.clone(),
            EnqueueSettings {
                topic: config.broker.topic.clone(),
                group_id: config.broker.group_id.clone(),
            },
        ));

        let orchestrator = Arc::new(SyncOrchestrator::new(
            gateway,
            store.clone(),
            deprovisioner,
            enqueuer,
            OrchestratorSettings { channel_ttl_secs: config.google.channel_ttl_secs },
        ));

        let index_consumer = Arc::new(VectorIndexConsumer::new(
            blobs,
            Arc::new(OpenAIEmbeddings::from_config(&config.embedding, http.clone())),
            Arc::new(OpenSearchIndex::new(http, &config.index)),
        ));
        let consumer = Arc::new(broker.consumer(&config.broker.group_id, &config.broker.topic));
        let index_worker = VectorIndexWorker::new(
            consumer,
            index_consumer,
            VectorIndexWorkerConfig::from_config(&config),
        );

        let sync_scheduler = match SyncSchedulerConfig::from_config(&config.sync) {
            Some(scheduler_config) => {
                let pool = Arc::new(CalendarSyncPool::new(
                    orchestrator,
                    config.sync.max_concurrent_calendars,
                    Duration::from_secs(config.sync.job_timeout_secs.max(1)),
                ));
                Some(
                    SyncScheduler::new(scheduler_config, Arc::clone(&store.integrations), pool)
                        .await?,
                )
            }
            None => None,
        };

        Ok(Self { config, db, index_worker, sync_scheduler })
    }

    pub async fn start(&mut self) -> Result<()> {
        self.index_worker.start().await?;
        if let Some(scheduler) = self.sync_scheduler.as_mut() {
            scheduler.start().await?;
        }
        Ok(())
    }

    /// Stop everything that was started; the first failure is returned after
    /// every component had its chance to stop.
    pub async fn shutdown(&mut self) -> Result<()> {
        let mut first_error: Option<CalSyncError> = None;
        if let Some(scheduler) = self.sync_scheduler.as_mut() {
            if scheduler.is_running() {
                if let Err(err) = scheduler.stop().await {
                    first_error.get_or_insert(err.into());
                }
            }
        }
        if self.index_worker.is_running() {
            if let Err(err) = self.index_worker.stop().await {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
