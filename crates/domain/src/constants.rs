//! Domain constants
//!
//! Centralized location for values shared by the sync pipeline and its
//! adapters.

// Provider item status
pub const CANCELLED_STATUS: &str = "cancelled";

// Composite record keys
pub const KEY_SEPARATOR: char = '#';

// Webhook channels
pub const WEBHOOK_CHANNEL_TTL_SECS: i64 = 604_800;
pub const WEBHOOK_CHANNEL_TYPE: &str = "web_hook";

// Integration resources
pub const GOOGLE_CALENDAR_RESOURCE: &str = "google_calendar";
pub const ZOOM_RESOURCE: &str = "zoom";
pub const GOOGLE_CONFERENCE_APP: &str = "google";

// Vector index propagation
pub const DEFAULT_VECTOR_TOPIC: &str = "calendar-vector-changes";
pub const DEFAULT_CONSUMER_GROUP: &str = "calendar-vector-index";
pub const STAGED_BATCH_EXTENSION: &str = "json";
pub const DEFAULT_EVENT_INDEX: &str = "calendar-events";
pub const EVENT_VECTOR_FIELD: &str = "embeddings";
pub const MIN_KNN_SCORE: f64 = 1.2;

// Token refresh
pub const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;
