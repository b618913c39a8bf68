//! Record store port interfaces for sync operations

use std::sync::Arc;

use async_trait::async_trait;
use calsync_domain::{
    AttendeeRow, CalendarIntegration, CalendarRecord, ConferenceRow, DeletedEventRef, EventRow,
    ReminderRow, Result, SyncCursor, SyncJob, WebhookChannel,
};
use chrono::{DateTime, Utc};

/// Event rows keyed by `"<eventId>#<calendarId>"`
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Insert or replace event rows by id.
    async fn upsert_events(&self, rows: &[EventRow]) -> Result<()>;

    /// Delete event rows, returning the identifiers of rows that existed.
    async fn delete_events(&self, ids: &[String]) -> Result<Vec<DeletedEventRef>>;
}

#[async_trait]
pub trait AttendeeRepository: Send + Sync {
    async fn upsert_attendees(&self, rows: &[AttendeeRow]) -> Result<()>;

    /// Remove every attendee of the given event keys.
    async fn delete_attendees_for_events(&self, event_ids: &[String]) -> Result<usize>;
}

#[async_trait]
pub trait ReminderRepository: Send + Sync {
    async fn insert_reminders(&self, rows: &[ReminderRow]) -> Result<()>;

    async fn delete_reminders_for_events(&self, user_id: &str, event_ids: &[String])
        -> Result<usize>;
}

/// Conference rows keyed by bare conference id
#[async_trait]
pub trait ConferenceRepository: Send + Sync {
    async fn upsert_conferences(&self, rows: &[ConferenceRow]) -> Result<()>;

    async fn find_conferences(&self, ids: &[String]) -> Result<Vec<ConferenceRow>>;

    async fn delete_conferences(&self, ids: &[String]) -> Result<usize>;
}

/// Scheduling-assist records linked to events through a meeting id
#[async_trait]
pub trait MeetingAssistRepository: Send + Sync {
    async fn delete_meeting_assists(&self, meeting_ids: &[String]) -> Result<usize>;
}

/// Per-calendar `{pageToken, syncToken}` storage
#[async_trait]
pub trait CursorRepository: Send + Sync {
    async fn load_cursor(&self, calendar_id: &str) -> Result<Option<SyncCursor>>;

    async fn save_cursor(&self, cursor: &SyncCursor) -> Result<()>;

    /// Clear both tokens ahead of a full resync.
    async fn reset_cursor(&self, calendar_id: &str) -> Result<()>;
}

/// At most one channel record per calendar
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn find_channel(&self, calendar_id: &str) -> Result<Option<WebhookChannel>>;

    async fn insert_channel(&self, channel: &WebhookChannel) -> Result<()>;

    async fn delete_channel(&self, channel_id: &str) -> Result<()>;
}

#[async_trait]
pub trait IntegrationRepository: Send + Sync {
    async fn find_integration(&self, id: &str) -> Result<Option<CalendarIntegration>>;

    async fn find_integration_for_user(
        &self,
        user_id: &str,
        resource: &str,
    ) -> Result<Option<CalendarIntegration>>;

    async fn find_calendar(&self, calendar_id: &str) -> Result<Option<CalendarRecord>>;

    async fn set_sync_enabled(&self, integration_id: &str, enabled: bool) -> Result<()>;

    async fn update_access_token(
        &self,
        integration_id: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Calendars whose integration is enabled, for periodic resyncs.
    async fn list_sync_jobs(&self) -> Result<Vec<SyncJob>>;
}

/// The record store as a bundle of repository handles.
#[derive(Clone)]
pub struct RecordStore {
    pub events: Arc<dyn EventRepository>,
    pub attendees: Arc<dyn AttendeeRepository>,
    pub reminders: Arc<dyn ReminderRepository>,
    pub conferences: Arc<dyn ConferenceRepository>,
    pub meeting_assists: Arc<dyn MeetingAssistRepository>,
    pub cursors: Arc<dyn CursorRepository>,
    pub webhooks: Arc<dyn WebhookRepository>,
    pub integrations: Arc<dyn IntegrationRepository>,
}

impl RecordStore {
    /// Build a bundle from one value implementing every repository.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: EventRepository
            + AttendeeRepository
            + ReminderRepository
            + ConferenceRepository
            + MeetingAssistRepository
            + CursorRepository
            + WebhookRepository
            + IntegrationRepository
            + 'static,
    {
        Self {
            events: store.clone(),
            attendees: store.clone(),
            reminders: store.clone(),
            conferences: store.clone(),
            meeting_assists: store.clone(),
            cursors: store.clone(),
            webhooks: store.clone(),
            integrations: store,
        }
    }
}
