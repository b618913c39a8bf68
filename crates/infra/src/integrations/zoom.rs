//! Zoom meeting deprovisioning for hosted conferences
//!
//! A conference is a Zoom meeting when its id is numeric. Meetings are deleted
//! with the user's stored Zoom access token; users without a usable token are
//! skipped so the conference rows can still be removed.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::sync::ports::IntegrationRepository;
use calsync_core::ConferenceDeprovisioner;
use calsync_domain::constants::ZOOM_RESOURCE;
use calsync_domain::{CalSyncError, ConferenceRow, Result, ZoomConfig};
use chrono::Utc;
use reqwest::{Method, StatusCode};
use tracing::{info, instrument, warn};

use crate::errors::status_error;
use crate::http::HttpClient;

pub struct ZoomDeprovisioner {
    http: HttpClient,
    integrations: Arc<dyn IntegrationRepository>,
    api_base: String,
}

impl ZoomDeprovisioner {
    pub fn new(
        http: HttpClient,
        integrations: Arc<dyn IntegrationRepository>,
        config: &ZoomConfig,
    ) -> Self {
        Self { http, integrations, api_base: config.api_base.trim_end_matches('/').to_string() }
    }

    async fn zoom_token(&self, user_id: &str) -> Result<Option<String>> {
        let Some(integration) =
            self.integrations.find_integration_for_user(user_id, ZOOM_RESOURCE).await?
        else {
            return Ok(None);
        };
        if integration.expires_at.is_some_and(|expires_at| expires_at <= Utc::now()) {
            warn!(integration_id = %integration.id, "zoom token expired");
            return Ok(None);
        }
        Ok(integration.access_token.filter(|token| !token.is_empty()))
    }
}

#[async_trait]
impl ConferenceDeprovisioner for ZoomDeprovisioner {
    #[instrument(skip(self, conference), fields(conference_id = %conference.id))]
    async fn deprovision(&self, user_id: &str, conference: &ConferenceRow) -> Result<()> {
        let Ok(meeting_id) = conference.id.trim().parse::<u64>() else {
            return Ok(());
        };
        let Some(token) = self.zoom_token(user_id).await? else {
            warn!(user_id, "no usable zoom token; meeting left in place");
            return Ok(());
        };

        let url = format!("{}/meetings/{meeting_id}", self.api_base);
        let request = self.http.request(Method::DELETE, url).bearer_auth(token);
        let response = self.http.send(request).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            info!(meeting_id, "zoom meeting already gone");
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status_error(status, &body) {
                CalSyncError::Provider(message) => {
                    CalSyncError::Provider(format!("zoom: {message}"))
                }
                other => other,
            });
        }
        info!(meeting_id, "zoom meeting deleted");
        Ok(())
    }
}
