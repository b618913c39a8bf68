//! Domain types and models

pub mod event;
pub mod index;
pub mod records;
pub mod sync;

pub use event::{
    composite_key, ChangePage, ChangeRequest, ColorDefinition, ColorPalette, ConferenceData,
    ConferenceSolution, ConferenceSolutionKey, EntryPoint, EventAttendee, EventDateTime,
    EventPerson, EventReminders, EventResource, ReminderOverride, WatchResponse,
};
pub use index::{
    ChangeMethod, IndexRecord, QueueMessage, SearchHit, StagedBatch, VectorChangeObject,
    VectorQuery,
};
pub use records::{AttendeeRow, ConferenceRow, DeletedEventRef, EventRow, ReminderRow};
pub use sync::{
    CalendarAccount, CalendarIntegration, CalendarRecord, ChangeEvent, ClientType, SyncCursor,
    SyncJob, WebhookChannel,
};
