//! Shared test helpers for `calsync-core` integration tests.
//!
//! In-memory fakes for every port plus a few resource builders, so the sync
//! and index tests can focus on behaviour instead of wiring.

#![allow(dead_code)]

pub mod index;
pub mod provider;
pub mod store;

use calsync_domain::{
    CalendarIntegration, CalendarRecord, ChangePage, ClientType, ConferenceData, EventDateTime,
    EventResource, SyncJob,
};

pub const CALENDAR: &str = "cal";
pub const USER: &str = "user-1";
pub const INTEGRATION: &str = "integration-1";

/// Confirmed, timed event with a timezone.
pub fn timed_event(id: &str, summary: &str) -> EventResource {
    EventResource {
        id: Some(id.into()),
        status: Some("confirmed".into()),
        summary: Some(summary.into()),
        created: Some("2026-04-01T00:00:00Z".into()),
        updated: Some("2026-04-02T00:00:00Z".into()),
        start: EventDateTime {
            date_time: Some("2026-05-04T09:00:00Z".into()),
            time_zone: Some("Europe/London".into()),
            ..Default::default()
        },
        end: EventDateTime {
            date_time: Some("2026-05-04T10:00:00Z".into()),
            time_zone: Some("Europe/London".into()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn with_conference(mut event: EventResource, conference_id: &str) -> EventResource {
    event.conference_data =
        Some(ConferenceData { conference_id: Some(conference_id.into()), ..Default::default() });
    event
}

pub fn cancelled(id: &str) -> EventResource {
    EventResource {
        id: Some(id.into()),
        status: Some("cancelled".into()),
        ..Default::default()
    }
}

pub fn page(
    items: Vec<EventResource>,
    next_page_token: Option<&str>,
    next_sync_token: Option<&str>,
) -> ChangePage {
    ChangePage {
        items,
        next_page_token: next_page_token.map(str::to_string),
        next_sync_token: next_sync_token.map(str::to_string),
    }
}

pub fn integration(client_type: Option<ClientType>) -> CalendarIntegration {
    CalendarIntegration {
        id: INTEGRATION.into(),
        user_id: USER.into(),
        resource: "google_calendar".into(),
        client_type,
        sync_enabled: true,
        access_token: Some("access".into()),
        refresh_token: Some("refresh".into()),
        expires_at: None,
    }
}

pub fn calendar() -> CalendarRecord {
    CalendarRecord {
        id: CALENDAR.into(),
        user_id: USER.into(),
        title: Some("Work".into()),
        resource: "google_calendar".into(),
    }
}

pub fn job() -> SyncJob {
    SyncJob {
        calendar_integration_id: INTEGRATION.into(),
        calendar_id: CALENDAR.into(),
        user_id: USER.into(),
        client_type: ClientType::Web,
    }
}
