//! Provider-side calendar resources
//!
//! Mirrors the subset of the Google Calendar v3 event resource the pipeline
//! reads. Every field is optional on the wire; validation happens where the
//! resource is persisted, not at decode time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::constants::{CANCELLED_STATUS, KEY_SEPARATOR};

/// Build the `"<id>#<calendarId>"` key used by events, attendees, reminders,
/// and index records.
pub fn composite_key(id: &str, calendar_id: &str) -> String {
    format!("{id}{KEY_SEPARATOR}{calendar_id}")
}

/// Event as delivered by the provider's change feed
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResource {
    pub id: Option<String>,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub color_id: Option<String>,
    pub html_link: Option<String>,
    pub recurring_event_id: Option<String>,
    pub i_cal_uid: Option<String>,
    pub transparency: Option<String>,
    pub visibility: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    #[serde(default)]
    pub start: EventDateTime,
    #[serde(default)]
    pub end: EventDateTime,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<EventAttendee>,
    pub organizer: Option<EventPerson>,
    pub reminders: Option<EventReminders>,
    pub conference_data: Option<ConferenceData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recurrence: Vec<String>,
}

impl EventResource {
    /// Terminal "removed" status; such items are always deletions.
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some(CANCELLED_STATUS)
    }

    /// Non-empty provider id.
    pub fn event_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.trim().is_empty())
    }

    /// Event timezone, preferring the start over the end.
    pub fn timezone(&self) -> Option<&str> {
        self.start.timezone().or_else(|| self.end.timezone())
    }

    pub fn is_all_day(&self) -> bool {
        self.start.date.is_some() && self.start.date_time.is_none()
    }

    /// Whether the resource carries enough to be persisted: a stable id and a
    /// timezone on start or end.
    pub fn is_persistable(&self) -> bool {
        self.event_id().is_some() && self.timezone().is_some()
    }

    pub fn composite_key(&self, calendar_id: &str) -> Option<String> {
        self.event_id().map(|id| composite_key(id, calendar_id))
    }

    /// Text the embedding is computed from: `summary[:description]`.
    pub fn embedding_text(&self) -> String {
        let summary = self.summary.as_deref().unwrap_or_default().trim();
        match self.description.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(description) if summary.is_empty() => description.to_string(),
            Some(description) => format!("{summary}:{description}"),
            None => summary.to_string(),
        }
    }
}

/// Start or end instant of an event
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    /// All-day date (`YYYY-MM-DD`).
    pub date: Option<String>,
    /// RFC 3339 timestamp.
    pub date_time: Option<String>,
    pub time_zone: Option<String>,
}

impl EventDateTime {
    pub fn timezone(&self) -> Option<&str> {
        self.time_zone.as_deref().filter(|tz| !tz.trim().is_empty())
    }

    /// Raw instant as delivered, preferring the timestamp over the date.
    pub fn raw(&self) -> Option<&str> {
        self.date_time.as_deref().or(self.date.as_deref())
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAttendee {
    pub id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub organizer: Option<bool>,
    #[serde(rename = "self")]
    pub is_self: Option<bool>,
    pub resource: Option<bool>,
    pub optional: Option<bool>,
    pub response_status: Option<String>,
    pub comment: Option<String>,
    pub additional_guests: Option<i64>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPerson {
    pub id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "self")]
    pub is_self: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventReminders {
    #[serde(default)]
    pub use_default: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<ReminderOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderOverride {
    pub method: String,
    pub minutes: i64,
}

/// Conference attached to an event (Meet, Zoom add-on, ...)
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceData {
    pub conference_id: Option<String>,
    pub conference_solution: Option<ConferenceSolution>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_points: Vec<EntryPoint>,
    pub notes: Option<String>,
    pub signature: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceSolution {
    pub key: Option<ConferenceSolutionKey>,
    pub name: Option<String>,
    pub icon_uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceSolutionKey {
    #[serde(rename = "type", default)]
    pub solution_type: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPoint {
    pub entry_point_type: Option<String>,
    pub uri: Option<String>,
    pub label: Option<String>,
    pub pin: Option<String>,
    pub access_code: Option<String>,
    pub meeting_code: Option<String>,
    pub passcode: Option<String>,
    pub password: Option<String>,
}

/// One page of the provider's change feed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangePage {
    pub items: Vec<EventResource>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

/// Cursor values sent with a change-feed request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeRequest {
    pub page_token: Option<String>,
    pub sync_token: Option<String>,
}

/// Result of opening a push-notification channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchResponse {
    pub resource_id: String,
    pub resource_uri: String,
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorDefinition {
    pub background: String,
    pub foreground: String,
}

/// Provider colour palette for events, keyed by `colorId`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorPalette {
    #[serde(default)]
    pub event: HashMap<String, ColorDefinition>,
}

impl ColorPalette {
    pub fn event_color(&self, color_id: Option<&str>) -> Option<&ColorDefinition> {
        color_id.and_then(|id| self.event.get(id))
    }
}
