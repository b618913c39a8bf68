//! Vector index propagation types

use serde::{Deserialize, Serialize};

use super::event::EventResource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeMethod {
    Upsert,
    Delete,
}

/// Change forwarded to the vector index, one per change-feed item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorChangeObject {
    pub method: ChangeMethod,
    pub event: EventResource,
    pub calendar_id: String,
}

impl VectorChangeObject {
    /// Index key `"<eventId>#<calendarId>"`, when the event has an id.
    pub fn index_key(&self) -> Option<String> {
        self.event.composite_key(&self.calendar_id)
    }
}

/// Payload staged in blob storage ahead of publishing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedBatch {
    pub user_id: String,
    pub events: Vec<VectorChangeObject>,
}

/// Broker message; references the staged batch instead of embedding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    #[serde(rename = "fileKey")]
    pub staged_batch_ref: String,
}

/// Unit of storage in the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub user_id: String,
    pub vector: Vec<f32>,
    pub start_date: String,
    pub end_date: String,
    pub raw_text: String,
}

/// Nearest-neighbour query filtered by user and start-date range
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub user_id: String,
    pub vector: Vec<f32>,
    pub start_after: Option<String>,
    pub start_before: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}
