//! Sync state types: cursors, change events, webhook channels, integrations

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{ChangePage, ChangeRequest, EventResource};
use crate::errors::CalSyncError;

/// OAuth client the integration was authorised from; selects the client
/// credentials used for token refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientType {
    #[serde(rename = "ios")]
    Ios,
    #[serde(rename = "android")]
    Android,
    #[serde(rename = "web")]
    Web,
    #[serde(rename = "atomic-web")]
    AtomicWeb,
}

impl ClientType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Web => "web",
            Self::AtomicWeb => "atomic-web",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientType {
    type Err = CalSyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            "web" => Ok(Self::Web),
            "atomic-web" => Ok(Self::AtomicWeb),
            other => Err(CalSyncError::InvalidInput(format!("unknown client type: {other}"))),
        }
    }
}

/// Identity the provider gateway authenticates as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarAccount {
    pub user_id: String,
    pub client_type: ClientType,
}

/// Resumable position in a calendar's change feed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub calendar_id: String,
    pub user_id: String,
    pub page_token: Option<String>,
    pub sync_token: Option<String>,
}

impl SyncCursor {
    /// Empty cursor: full enumeration from the first page.
    pub fn initial(calendar_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            user_id: user_id.into(),
            page_token: None,
            sync_token: None,
        }
    }

    /// A stored sync token means the next run is incremental.
    pub fn is_incremental(&self) -> bool {
        self.sync_token.as_deref().is_some_and(|token| !token.is_empty())
    }

    pub fn request(&self) -> ChangeRequest {
        ChangeRequest { page_token: self.page_token.clone(), sync_token: self.sync_token.clone() }
    }

    /// Cursor after applying `page`. The page token always follows the page
    /// (cleared on the last page); the sync token is replaced only when the
    /// page carries one.
    pub fn advance(&self, page: &ChangePage) -> Self {
        Self {
            calendar_id: self.calendar_id.clone(),
            user_id: self.user_id.clone(),
            page_token: page.next_page_token.clone().filter(|token| !token.is_empty()),
            sync_token: page
                .next_sync_token
                .clone()
                .filter(|token| !token.is_empty())
                .or_else(|| self.sync_token.clone()),
        }
    }
}

/// Classified change-feed item
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Upsert(EventResource),
    Delete { id: String },
}

impl ChangeEvent {
    /// Classify by status: a cancelled item is always a deletion.
    pub fn classify(item: EventResource) -> Self {
        if item.is_cancelled() {
            Self::Delete { id: item.id.unwrap_or_default() }
        } else {
            Self::Upsert(item)
        }
    }

    pub const fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// Provider push-notification channel record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookChannel {
    pub channel_id: String,
    pub calendar_id: String,
    pub calendar_integration_id: String,
    pub user_id: String,
    pub resource_id: String,
    pub resource_uri: String,
    pub token: String,
    pub expiration: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored calendar integration (one per user and provider resource)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarIntegration {
    pub id: String,
    pub user_id: String,
    pub resource: String,
    pub client_type: Option<ClientType>,
    pub sync_enabled: bool,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Stored calendar record that owns the sync cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRecord {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub resource: String,
}

/// One orchestrator invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub calendar_integration_id: String,
    pub calendar_id: String,
    pub user_id: String,
    pub client_type: ClientType,
}

impl SyncJob {
    pub fn account(&self) -> CalendarAccount {
        CalendarAccount { user_id: self.user_id.clone(), client_type: self.client_type }
    }
}
