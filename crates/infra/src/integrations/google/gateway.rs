//! Google Calendar v3 implementation of [`ProviderGateway`]

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::{AccessTokenSource, ProviderGateway};
use calsync_domain::constants::WEBHOOK_CHANNEL_TYPE;
use calsync_domain::{
    CalSyncError, CalendarAccount, ChangePage, ChangeRequest, ColorPalette, GoogleConfig, Result,
    WatchResponse,
};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Method, RequestBuilder};
use tracing::{debug, instrument, warn};
use url::Url;

use super::types::{
    EventsListResponse, StopChannelRequest, WatchChannelResponse, WatchParams, WatchRequest,
};
use crate::errors::status_error;
use crate::http::client::{decode_json, ensure_success};
use crate::http::HttpClient;

pub struct GoogleCalendarGateway {
    http: HttpClient,
    tokens: Arc<dyn AccessTokenSource>,
    api_base: Url,
    webhook_address: String,
    channel_ttl_secs: i64,
    initial_time_min: Option<String>,
}

impl GoogleCalendarGateway {
    /// `http` should be built with a single attempt; retries belong to the
    /// caller.
    pub fn new(
        http: HttpClient,
        tokens: Arc<dyn AccessTokenSource>,
        config: &GoogleConfig,
    ) -> Result<Self> {
        let api_base = Url::parse(&config.api_base).map_err(|err| {
            CalSyncError::Config(format!("invalid google api_base {:?}: {err}", config.api_base))
        })?;
        if api_base.cannot_be_a_base() {
            return Err(CalSyncError::Config(format!(
                "google api_base {:?} cannot be a base URL",
                config.api_base
            )));
        }
        Ok(Self {
            http,
            tokens,
            api_base,
            webhook_address: config.webhook_address.clone(),
            channel_ttl_secs: config.channel_ttl_secs,
            initial_time_min: config.initial_time_min.clone(),
        })
    }

    /// Append percent-encoded path segments to the API base.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn authorized(
        &self,
        account: &CalendarAccount,
        method: Method,
        url: Url,
    ) -> Result<RequestBuilder> {
        let token = self.tokens.access_token(account).await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }
}

#[async_trait]
impl ProviderGateway for GoogleCalendarGateway {
    #[instrument(
        skip(self, account, request),
        fields(
            user_id = %account.user_id,
            incremental = request.sync_token.is_some(),
            has_page_token = request.page_token.is_some()
        )
    )]
    async fn list_changes(
        &self,
        account: &CalendarAccount,
        calendar_id: &str,
        request: &ChangeRequest,
    ) -> Result<ChangePage> {
        let mut url = self.endpoint(&["calendars", calendar_id, "events"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("singleEvents", "true").append_pair("showDeleted", "true");
            match (&request.sync_token, &self.initial_time_min) {
                (Some(sync_token), _) => {
                    query.append_pair("syncToken", sync_token);
                }
                // the provider rejects timeMin alongside a sync token
                (None, Some(time_min)) => {
                    query.append_pair("timeMin", time_min);
                }
                (None, None) => {}
            }
            if let Some(page_token) = &request.page_token {
                query.append_pair("pageToken", page_token);
            }
        }

        let builder = self.authorized(account, Method::GET, url).await?;
        let response: EventsListResponse = self.http.send_json(builder).await?;
        debug!(
            items = response.items.len(),
            has_next_page = response.next_page_token.is_some(),
            has_sync_token = response.next_sync_token.is_some(),
            "change page fetched"
        );
        Ok(ChangePage {
            items: response.items,
            next_page_token: response.next_page_token.filter(|token| !token.is_empty()),
            next_sync_token: response.next_sync_token.filter(|token| !token.is_empty()),
        })
    }

    #[instrument(skip(self, account, token), fields(user_id = %account.user_id))]
    async fn watch(
        &self,
        account: &CalendarAccount,
        calendar_id: &str,
        channel_id: &str,
        token: &str,
    ) -> Result<WatchResponse> {
        if self.webhook_address.is_empty() {
            return Err(CalSyncError::Config("google webhook_address is not configured".into()));
        }
        let url = self.endpoint(&["calendars", calendar_id, "events", "watch"]);
        let body = WatchRequest {
            id: channel_id,
            token,
            channel_type: WEBHOOK_CHANNEL_TYPE,
            address: &self.webhook_address,
            params: (self.channel_ttl_secs > 0)
                .then(|| WatchParams { ttl: self.channel_ttl_secs.to_string() }),
        };

        let builder = self.authorized(account, Method::POST, url).await?.json(&body);
        let channel: WatchChannelResponse = self.http.send_json(builder).await?;
        Ok(WatchResponse {
            resource_id: channel.resource_id,
            resource_uri: channel.resource_uri,
            expiration: channel.expiration.as_deref().and_then(parse_expiration),
        })
    }

    #[instrument(skip(self, account), fields(user_id = %account.user_id))]
    async fn stop_watch(
        &self,
        account: &CalendarAccount,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<()> {
        let url = self.endpoint(&["channels", "stop"]);
        let body = StopChannelRequest { id: channel_id, resource_id };
        let builder = self.authorized(account, Method::POST, url).await?.json(&body);
        let response = self.http.send(builder).await?;
        let status = response.status();
        // Channels expire on their own; an unknown channel is already stopped.
        if status == reqwest::StatusCode::NOT_FOUND {
            warn!(channel_id, "channel unknown to provider");
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        Ok(())
    }

    async fn colors(&self, account: &CalendarAccount) -> Result<ColorPalette> {
        let url = self.endpoint(&["colors"]);
        let builder = self.authorized(account, Method::GET, url).await?;
        let response = ensure_success(self.http.send(builder).await?).await?;
        decode_json(response).await
    }
}

fn parse_expiration(raw: &str) -> Option<DateTime<Utc>> {
    let millis = raw.trim().parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}
