//! Request entry point relaying the orchestrator result as a
//! `{success, message, status}` response.

use calsync_domain::constants::GOOGLE_CALENDAR_RESOURCE;
use calsync_domain::{CalSyncError, SyncJob};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::orchestrator::{SyncOrchestrator, SyncOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub calendar_integration_id: String,
    pub calendar_id: String,
    pub user_id: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sync_disabled: bool,
}

impl SyncResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), status: 200, sync_disabled: false }
    }

    fn failed(status: u16, message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), status, sync_disabled: false }
    }

    fn disabled(reason: &str) -> Self {
        Self {
            success: true,
            message: format!("sync is disabled for this calendar: {reason}"),
            status: 200,
            sync_disabled: true,
        }
    }

    fn from_error(err: &CalSyncError) -> Self {
        let status = match err {
            CalSyncError::InvalidInput(_) => 400,
            CalSyncError::NotFound(_) => 404,
            CalSyncError::CursorInvalidated(_) => 409,
            CalSyncError::Network(_) | CalSyncError::Provider(_) => 502,
            _ => 500,
        };
        Self::failed(status, err.to_string())
    }
}

/// Validate the request, resolve the integration, and run one sync.
#[instrument(
    skip(orchestrator, request),
    fields(calendar_id = %request.calendar_id, user_id = %request.user_id)
)]
pub async fn perform_calendar_sync(
    orchestrator: &SyncOrchestrator,
    request: &SyncRequest,
) -> SyncResponse {
    let job = match resolve_job(orchestrator, request).await {
        Ok(job) => job,
        Err(response) => {
            warn!(status = response.status, message = %response.message, "sync request rejected");
            return response;
        }
    };

    match orchestrator.run_sync(&job).await {
        Ok(SyncOutcome::Disabled { reason }) => SyncResponse::disabled(&reason),
        Ok(SyncOutcome::Completed(report)) => {
            match (&report.webhook_error, &report.fetch.enqueue_error) {
                (Some(err), _) => SyncResponse::failed(
                    500,
                    format!("calendar synced but webhook setup failed: {err}"),
                ),
                (None, Some(err)) => SyncResponse::failed(
                    500,
                    format!("calendar synced but vector index enqueue failed: {err}"),
                ),
                (None, None) => {
                    info!(
                        pages = report.fetch.pages,
                        resynced = report.resynced,
                        "calendar sync succeeded"
                    );
                    SyncResponse::ok("successfully synced calendar")
                }
            }
        }
        Err(err) => {
            error!(error = %err, "calendar sync failed");
            SyncResponse::from_error(&err)
        }
    }
}

async fn resolve_job(
    orchestrator: &SyncOrchestrator,
    request: &SyncRequest,
) -> std::result::Result<SyncJob, SyncResponse> {
    let timezone = request.timezone.as_deref().map(str::trim).unwrap_or_default();
    if timezone.is_empty() {
        return Err(SyncResponse::failed(400, "no timezone present"));
    }
    if timezone.parse::<Tz>().is_err() {
        return Err(SyncResponse::failed(400, format!("unknown timezone: {timezone}")));
    }
    if request.calendar_id.trim().is_empty() || request.user_id.trim().is_empty() {
        return Err(SyncResponse::failed(400, "calendar id and user id are required"));
    }

    let store = orchestrator.store();
    let stored = |err: CalSyncError| SyncResponse::from_error(&err);

    let integration = store
        .integrations
        .find_integration(&request.calendar_integration_id)
        .await
        .map_err(stored)?
        .filter(|integration| integration.resource == GOOGLE_CALENDAR_RESOURCE)
        .ok_or_else(|| SyncResponse::failed(404, "calendar integration not found"))?;

    store
        .integrations
        .find_calendar(&request.calendar_id)
        .await
        .map_err(stored)?
        .ok_or_else(|| SyncResponse::failed(400, "calendar was removed or never existed"))?;

    let client_type = integration
        .client_type
        .ok_or_else(|| SyncResponse::failed(400, "integration has no client type"))?;

    Ok(SyncJob {
        calendar_integration_id: integration.id,
        calendar_id: request.calendar_id.clone(),
        user_id: request.user_id.clone(),
        client_type,
    })
}
