//! SQLite record store

pub mod attendee_repository;
pub mod conference_repository;
pub mod cursor_repository;
pub mod event_repository;
pub mod integration_repository;
pub mod manager;
pub mod reminder_repository;
pub(crate) mod sql;

use std::sync::Arc;

use calsync_core::RecordStore;

pub use attendee_repository::*;
pub use conference_repository::*;
pub use cursor_repository::*;
pub use event_repository::*;
pub use integration_repository::*;
pub use manager::*;
pub use reminder_repository::*;

/// Bundle every SQLite repository over one shared pool.
pub fn sqlite_record_store(db: Arc<DbManager>) -> RecordStore {
    RecordStore {
        events: Arc::new(SqliteEventRepository::new(Arc::clone(&db))),
        attendees: Arc::new(SqliteAttendeeRepository::new(Arc::clone(&db))),
        reminders: Arc::new(SqliteReminderRepository::new(Arc::clone(&db))),
        conferences: Arc::new(SqliteConferenceRepository::new(Arc::clone(&db))),
        meeting_assists: Arc::new(SqliteMeetingAssistRepository::new(Arc::clone(&db))),
        cursors: Arc::new(SqliteCursorRepository::new(Arc::clone(&db))),
        webhooks: Arc::new(SqliteWebhookRepository::new(Arc::clone(&db))),
        integrations: Arc::new(SqliteIntegrationRepository::new(db)),
    }
}
