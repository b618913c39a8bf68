//! In-memory record store
//!
//! Implements every repository port over one mutex-guarded state and appends
//! each call to a shared [`Journal`], so tests can assert on the order in
//! which the coordinator and orchestrator touch the store.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use calsync_core::sync::ports::{
    AttendeeRepository, ConferenceRepository, CursorRepository, EventRepository,
    IntegrationRepository, MeetingAssistRepository, ReminderRepository, WebhookRepository,
};
use calsync_core::RecordStore;
use calsync_domain::{
    AttendeeRow, CalSyncError, CalendarIntegration, CalendarRecord, ConferenceRow,
    DeletedEventRef, EventRow, ReminderRow, Result, SyncCursor, SyncJob, WebhookChannel,
};
use chrono::{DateTime, Utc};

/// Ordered log of calls shared between fakes.
#[derive(Default, Clone)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Position of the first entry starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|entry| entry.starts_with(prefix))
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

#[derive(Default, Clone, PartialEq, Eq, Debug)]
pub struct StoreState {
    pub events: BTreeMap<String, EventRow>,
    pub attendees: BTreeMap<String, AttendeeRow>,
    pub reminders: BTreeMap<String, ReminderRow>,
    pub conferences: BTreeMap<String, ConferenceRow>,
    pub meeting_assists: BTreeMap<String, String>,
    /// Event key to the scheduling-assist meeting it belongs to.
    pub meeting_links: BTreeMap<String, String>,
    pub cursors: BTreeMap<String, SyncCursor>,
    pub channels: BTreeMap<String, WebhookChannel>,
    pub integrations: BTreeMap<String, CalendarIntegration>,
    pub calendars: BTreeMap<String, CalendarRecord>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    journal: Journal,
    failing: Mutex<HashSet<&'static str>>,
    saved_cursors: Mutex<Vec<SyncCursor>>,
}

impl InMemoryStore {
    pub fn new(journal: Journal) -> Arc<Self> {
        Arc::new(Self { journal, ..Default::default() })
    }

    pub fn record_store(self: &Arc<Self>) -> RecordStore {
        RecordStore::from_shared(self.clone())
    }

    /// Make the named operation fail with a database error.
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn snapshot(&self) -> StoreState {
        self.state.lock().unwrap().clone()
    }

    pub fn with_state(&self, seed: impl FnOnce(&mut StoreState)) {
        seed(&mut self.state.lock().unwrap());
    }

    /// Every cursor passed to `save_cursor`, in order.
    pub fn saved_cursors(&self) -> Vec<SyncCursor> {
        self.saved_cursors.lock().unwrap().clone()
    }

    fn enter(&self, operation: &'static str, detail: &str) -> Result<()> {
        self.journal.push(if detail.is_empty() {
            operation.to_string()
        } else {
            format!("{operation}:{detail}")
        });
        if self.failing.lock().unwrap().contains(operation) {
            return Err(CalSyncError::Database(format!("{operation} failed")));
        }
        Ok(())
    }
}

fn keys(ids: &[String]) -> String {
    ids.join(",")
}

#[async_trait]
impl EventRepository for InMemoryStore {
    async fn upsert_events(&self, rows: &[EventRow]) -> Result<()> {
        let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        self.enter("upsert_events", &keys(&ids))?;
        let mut state = self.state.lock().unwrap();
        for row in rows {
            state.events.insert(row.id.clone(), row.clone());
        }
        Ok(())
    }

    async fn delete_events(&self, ids: &[String]) -> Result<Vec<DeletedEventRef>> {
        self.enter("delete_events", &keys(ids))?;
        let mut state = self.state.lock().unwrap();
        let mut deleted = Vec::new();
        for id in ids {
            if let Some(row) = state.events.remove(id) {
                let meeting_id = state.meeting_links.get(id).cloned();
                deleted.push(DeletedEventRef {
                    id: row.id,
                    event_id: row.event_id,
                    calendar_id: row.calendar_id,
                    conference_id: row.conference_id,
                    meeting_id,
                });
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl AttendeeRepository for InMemoryStore {
    async fn upsert_attendees(&self, rows: &[AttendeeRow]) -> Result<()> {
        let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        self.enter("upsert_attendees", &keys(&ids))?;
        let mut state = self.state.lock().unwrap();
        for row in rows {
            state.attendees.insert(row.id.clone(), row.clone());
        }
        Ok(())
    }

    async fn delete_attendees_for_events(&self, event_ids: &[String]) -> Result<usize> {
        self.enter("delete_attendees", &keys(event_ids))?;
        let mut state = self.state.lock().unwrap();
        let before = state.attendees.len();
        state.attendees.retain(|_, row| !event_ids.contains(&row.event_id));
        Ok(before - state.attendees.len())
    }
}

#[async_trait]
impl ReminderRepository for InMemoryStore {
    async fn insert_reminders(&self, rows: &[ReminderRow]) -> Result<()> {
        let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        self.enter("insert_reminders", &keys(&ids))?;
        let mut state = self.state.lock().unwrap();
        for row in rows {
            state.reminders.insert(row.id.clone(), row.clone());
        }
        Ok(())
    }

    async fn delete_reminders_for_events(
        &self,
        user_id: &str,
        event_ids: &[String],
    ) -> Result<usize> {
        self.enter("delete_reminders", &keys(event_ids))?;
        let mut state = self.state.lock().unwrap();
        let before = state.reminders.len();
        state
            .reminders
            .retain(|_, row| !(row.user_id == user_id && event_ids.contains(&row.event_id)));
        Ok(before - state.reminders.len())
    }
}

#[async_trait]
impl ConferenceRepository for InMemoryStore {
    async fn upsert_conferences(&self, rows: &[ConferenceRow]) -> Result<()> {
        let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        self.enter("upsert_conferences", &keys(&ids))?;
        let mut state = self.state.lock().unwrap();
        for row in rows {
            state.conferences.insert(row.id.clone(), row.clone());
        }
        Ok(())
    }

    async fn find_conferences(&self, ids: &[String]) -> Result<Vec<ConferenceRow>> {
        self.enter("find_conferences", &keys(ids))?;
        let state = self.state.lock().unwrap();
        Ok(ids.iter().filter_map(|id| state.conferences.get(id).cloned()).collect())
    }

    async fn delete_conferences(&self, ids: &[String]) -> Result<usize> {
        self.enter("delete_conferences", &keys(ids))?;
        let mut state = self.state.lock().unwrap();
        Ok(ids.iter().filter(|id| state.conferences.remove(*id).is_some()).count())
    }
}

#[async_trait]
impl MeetingAssistRepository for InMemoryStore {
    async fn delete_meeting_assists(&self, meeting_ids: &[String]) -> Result<usize> {
        self.enter("delete_meeting_assists", &keys(meeting_ids))?;
        let mut state = self.state.lock().unwrap();
        Ok(meeting_ids.iter().filter(|id| state.meeting_assists.remove(*id).is_some()).count())
    }
}

#[async_trait]
impl CursorRepository for InMemoryStore {
    async fn load_cursor(&self, calendar_id: &str) -> Result<Option<SyncCursor>> {
        self.enter("load_cursor", calendar_id)?;
        Ok(self.state.lock().unwrap().cursors.get(calendar_id).cloned())
    }

    async fn save_cursor(&self, cursor: &SyncCursor) -> Result<()> {
        self.enter("save_cursor", cursor.page_token.as_deref().unwrap_or("-"))?;
        self.saved_cursors.lock().unwrap().push(cursor.clone());
        self.state.lock().unwrap().cursors.insert(cursor.calendar_id.clone(), cursor.clone());
        Ok(())
    }

    async fn reset_cursor(&self, calendar_id: &str) -> Result<()> {
        self.enter("reset_cursor", calendar_id)?;
        if let Some(cursor) = self.state.lock().unwrap().cursors.get_mut(calendar_id) {
            cursor.page_token = None;
            cursor.sync_token = None;
        }
        Ok(())
    }
}

#[async_trait]
impl WebhookRepository for InMemoryStore {
    async fn find_channel(&self, calendar_id: &str) -> Result<Option<WebhookChannel>> {
        self.enter("find_channel", calendar_id)?;
        let state = self.state.lock().unwrap();
        Ok(state.channels.values().find(|c| c.calendar_id == calendar_id).cloned())
    }

    async fn insert_channel(&self, channel: &WebhookChannel) -> Result<()> {
        self.enter("insert_channel", &channel.channel_id)?;
        let mut state = self.state.lock().unwrap();
        state.channels.insert(channel.channel_id.clone(), channel.clone());
        Ok(())
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<()> {
        self.enter("delete_channel", channel_id)?;
        self.state.lock().unwrap().channels.remove(channel_id);
        Ok(())
    }
}

#[async_trait]
impl IntegrationRepository for InMemoryStore {
    async fn find_integration(&self, id: &str) -> Result<Option<CalendarIntegration>> {
        Ok(self.state.lock().unwrap().integrations.get(id).cloned())
    }

    async fn find_integration_for_user(
        &self,
        user_id: &str,
        resource: &str,
    ) -> Result<Option<CalendarIntegration>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .integrations
            .values()
            .find(|i| i.user_id == user_id && i.resource == resource)
            .cloned())
    }

    async fn find_calendar(&self, calendar_id: &str) -> Result<Option<CalendarRecord>> {
        Ok(self.state.lock().unwrap().calendars.get(calendar_id).cloned())
    }

    async fn set_sync_enabled(&self, integration_id: &str, enabled: bool) -> Result<()> {
        self.enter("set_sync_enabled", &format!("{integration_id}={enabled}"))?;
        if let Some(integration) = self.state.lock().unwrap().integrations.get_mut(integration_id)
        {
            integration.sync_enabled = enabled;
        }
        Ok(())
    }

    async fn update_access_token(
        &self,
        integration_id: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(integration) = self.state.lock().unwrap().integrations.get_mut(integration_id)
        {
            integration.access_token = Some(access_token.to_string());
            integration.expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn list_sync_jobs(&self) -> Result<Vec<SyncJob>> {
        let state = self.state.lock().unwrap();
        let mut jobs = Vec::new();
        for calendar in state.calendars.values() {
            let integration = state
                .integrations
                .values()
                .find(|i| i.user_id == calendar.user_id && i.resource == calendar.resource);
            if let Some(integration) = integration.filter(|i| i.sync_enabled) {
                if let Some(client_type) = integration.client_type {
                    jobs.push(SyncJob {
                        calendar_integration_id: integration.id.clone(),
                        calendar_id: calendar.id.clone(),
                        user_id: calendar.user_id.clone(),
                        client_type,
                    });
                }
            }
        }
        Ok(jobs)
    }
}
