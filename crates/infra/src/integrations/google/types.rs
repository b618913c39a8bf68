//! Wire types for the Google Calendar and OAuth endpoints

use calsync_domain::EventResource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventsListResponse {
    #[serde(default)]
    pub items: Vec<EventResource>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct WatchRequest<'a> {
    pub id: &'a str,
    pub token: &'a str,
    #[serde(rename = "type")]
    pub channel_type: &'a str,
    pub address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<WatchParams>,
}

#[derive(Debug, Serialize)]
pub(crate) struct WatchParams {
    /// Requested channel lifetime in seconds, as a string.
    pub ttl: String,
}

/// `expiration` is milliseconds since the epoch, encoded as a string.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WatchChannelResponse {
    pub resource_id: String,
    #[serde(default)]
    pub resource_uri: String,
    pub expiration: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StopChannelRequest<'a> {
    pub id: &'a str,
    pub resource_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    /// Seconds until expiry.
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}
