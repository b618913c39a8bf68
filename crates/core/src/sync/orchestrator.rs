//! Sync orchestrator
//!
//! Chooses initial or incremental sync from the stored cursor, runs the
//! change-fetch loop, recovers from cursor invalidation with a single full
//! resync, and rotates the calendar's webhook channel after a successful run.

use std::sync::Arc;

use calsync_domain::constants::WEBHOOK_CHANNEL_TTL_SECS;
use calsync_domain::{
    CalSyncError, CalendarAccount, ColorPalette, Result, SyncCursor, SyncJob, WebhookChannel,
};
use chrono::{Duration, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::fanout::FanoutCoordinator;
use super::fetch_loop::{ChangeFetchLoop, FetchOutcome};
use super::ports::RecordStore;
use crate::calendar_ports::{ConferenceDeprovisioner, ProviderGateway};
use crate::index::ports::VectorChangePublisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Expiration applied when the provider's watch response carries none.
    pub channel_ttl_secs: i64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self { channel_ttl_secs: WEBHOOK_CHANNEL_TTL_SECS }
    }
}

/// Result of a run that did not fail outright
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// The integration can no longer be synced; its disabled state has been
    /// persisted.
    Disabled { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub fetch: FetchOutcome,
    /// True when the run recovered from an invalidated cursor.
    pub resynced: bool,
    /// Channel inserted by the rotation, if it succeeded.
    pub channel: Option<WebhookChannel>,
    /// Rotation failure, reported alongside the successful sync.
    pub webhook_error: Option<CalSyncError>,
}

impl SyncReport {
    pub fn webhook_rotated(&self) -> bool {
        self.channel.is_some() && self.webhook_error.is_none()
    }
}

pub struct SyncOrchestrator {
    gateway: Arc<dyn ProviderGateway>,
    store: RecordStore,
    fetch_loop: ChangeFetchLoop,
    settings: OrchestratorSettings,
}

impl SyncOrchestrator {
    pub fn new(
        gateway: Arc<dyn ProviderGateway>,
        store: RecordStore,
        deprovisioner: Arc<dyn ConferenceDeprovisioner>,
        publisher: Arc<dyn VectorChangePublisher>,
        settings: OrchestratorSettings,
    ) -> Self {
        let coordinator = FanoutCoordinator::new(store.clone(), deprovisioner);
        let fetch_loop =
            ChangeFetchLoop::new(gateway.clone(), store.clone(), coordinator, publisher);
        Self { gateway, store, fetch_loop, settings }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Sync one calendar.
    ///
    /// Only `CursorInvalidated` is retried, once, as an initial sync. A
    /// revoked integration yields [`SyncOutcome::Disabled`]; every other error
    /// is returned as-is with the last persisted cursor left in place.
    #[instrument(
        skip(self, job),
        fields(
            calendar_id = %job.calendar_id,
            user_id = %job.user_id,
            client_type = %job.client_type
        )
    )]
    pub async fn run_sync(&self, job: &SyncJob) -> Result<SyncOutcome> {
        let integration = self
            .store
            .integrations
            .find_integration(&job.calendar_integration_id)
            .await?
            .ok_or_else(|| {
                CalSyncError::NotFound(format!(
                    "calendar integration {}",
                    job.calendar_integration_id
                ))
            })?;
        if !integration.sync_enabled {
            info!("integration has sync disabled; skipping");
            return Ok(SyncOutcome::Disabled { reason: "integration sync is disabled".into() });
        }

        let account = job.account();
        let palette = self.load_palette(&account).await;

        let mut cursor = self
            .store
            .cursors
            .load_cursor(&job.calendar_id)
            .await?
            .filter(SyncCursor::is_incremental)
            .unwrap_or_else(|| SyncCursor::initial(&job.calendar_id, &job.user_id));
        let mut resynced = false;

        let fetch = loop {
            info!(incremental = cursor.is_incremental(), resynced, "starting change fetch");
            match self.fetch_loop.fetch_and_apply(&account, cursor, palette.as_ref()).await {
                Ok(outcome) => break outcome,
                Err(CalSyncError::CursorInvalidated(reason)) if !resynced => {
                    warn!(reason = %reason, "sync cursor invalidated; running full resync");
                    self.store.cursors.reset_cursor(&job.calendar_id).await?;
                    cursor = SyncCursor::initial(&job.calendar_id, &job.user_id);
                    resynced = true;
                }
                Err(CalSyncError::SyncDisabled(reason)) => {
                    self.disable(job, &account).await?;
                    return Ok(SyncOutcome::Disabled { reason });
                }
                Err(err) => return Err(err),
            }
        };

        let (channel, webhook_error) = match self.rotate_webhook(job, &account).await {
            Ok(channel) => (Some(channel), None),
            Err(err) => {
                warn!(error = %err, "webhook rotation failed; sync result kept");
                (None, Some(err))
            }
        };

        Ok(SyncOutcome::Completed(SyncReport { fetch, resynced, channel, webhook_error }))
    }

    async fn load_palette(&self, account: &CalendarAccount) -> Option<ColorPalette> {
        match self.gateway.colors(account).await {
            Ok(palette) => Some(palette),
            Err(CalSyncError::SyncDisabled(_)) => None,
            Err(err) => {
                warn!(error = %err, "failed to load colour palette; continuing without colours");
                None
            }
        }
    }

    /// Stop and delete the existing channel, then open and persist a new one.
    async fn rotate_webhook(
        &self,
        job: &SyncJob,
        account: &CalendarAccount,
    ) -> Result<WebhookChannel> {
        if let Some(existing) = self.store.webhooks.find_channel(&job.calendar_id).await? {
            // A failed stop keeps the old channel on record; only a channel
            // the provider no longer knows is replaced.
            match self
                .gateway
                .stop_watch(account, &existing.channel_id, &existing.resource_id)
                .await
            {
                Ok(()) => {}
                Err(CalSyncError::NotFound(reason)) => {
                    debug!(
                        channel_id = %existing.channel_id,
                        reason = %reason,
                        "webhook channel already stopped"
                    );
                }
                Err(err) => return Err(err),
            }
            self.store.webhooks.delete_channel(&existing.channel_id).await?;
        }

        let channel_id = Uuid::new_v4().to_string();
        let token = Uuid::new_v4().to_string();
        let watch = self.gateway.watch(account, &job.calendar_id, &channel_id, &token).await?;

        let now = Utc::now();
        let channel = WebhookChannel {
            channel_id,
            calendar_id: job.calendar_id.clone(),
            calendar_integration_id: job.calendar_integration_id.clone(),
            user_id: job.user_id.clone(),
            resource_id: watch.resource_id,
            resource_uri: watch.resource_uri,
            token,
            expiration: watch
                .expiration
                .unwrap_or_else(|| now + Duration::seconds(self.settings.channel_ttl_secs)),
            created_at: now,
            updated_at: now,
        };
        self.store.webhooks.insert_channel(&channel).await?;

        info!(
            channel_id = %channel.channel_id,
            expiration = %channel.expiration,
            "webhook channel rotated"
        );
        Ok(channel)
    }

    /// Persist the disabled state and tear down the calendar's channel.
    async fn disable(&self, job: &SyncJob, account: &CalendarAccount) -> Result<()> {
        warn!("integration revoked; disabling sync");
        self.store.integrations.set_sync_enabled(&job.calendar_integration_id, false).await?;

        match self.store.webhooks.find_channel(&job.calendar_id).await {
            Ok(Some(existing)) => {
                if let Err(err) = self
                    .gateway
                    .stop_watch(account, &existing.channel_id, &existing.resource_id)
                    .await
                {
                    warn!(
                        channel_id = %existing.channel_id,
                        error = %err,
                        "failed to stop webhook channel"
                    );
                }
                if let Err(err) = self.store.webhooks.delete_channel(&existing.channel_id).await {
                    warn!(
                        channel_id = %existing.channel_id,
                        error = %err,
                        "failed to delete webhook channel"
                    );
                }
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to look up webhook channel"),
        }
        Ok(())
    }
}
