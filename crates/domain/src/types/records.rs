//! Record store row types
//!
//! Rows written by the fan-out coordinator. Events, attendees, and reminders
//! are keyed by `"<id>#<calendarId>"`; conferences by their bare id.

use serde::{Deserialize, Serialize};

/// Event row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRow {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub calendar_id: String,
    pub summary: Option<String>,
    pub notes: Option<String>,
    pub location: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub all_day: bool,
    pub timezone: Option<String>,
    pub recurring_event_id: Option<String>,
    pub html_link: Option<String>,
    pub conference_id: Option<String>,
    pub color_id: Option<String>,
    pub background_color: Option<String>,
    pub foreground_color: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Attendee row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeRow {
    pub id: String,
    /// Composite key of the owning event.
    pub event_id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub response_status: Option<String>,
    pub optional: bool,
    pub resource: bool,
    pub organizer: bool,
    pub comment: Option<String>,
    pub additional_guests: i64,
}

/// Reminder row; either a single `use_default` marker or one row per override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRow {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub use_default: bool,
    pub method: Option<String>,
    pub minutes: Option<i64>,
    pub timezone: Option<String>,
}

/// Conference row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceRow {
    pub id: String,
    pub user_id: String,
    pub calendar_id: String,
    pub event_id: Option<String>,
    pub conference_type: Option<String>,
    pub name: Option<String>,
    pub icon_uri: Option<String>,
    /// JSON-encoded entry points.
    pub entry_points: Option<String>,
    pub notes: Option<String>,
    pub app: String,
    pub is_host: bool,
}

/// Identifiers returned when an event row is deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedEventRef {
    pub id: String,
    pub event_id: String,
    pub calendar_id: String,
    pub conference_id: Option<String>,
    pub meeting_id: Option<String>,
}
