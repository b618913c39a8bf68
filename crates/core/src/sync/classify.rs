//! Page classification into delete and upsert sets

use calsync_domain::{ChangeEvent, ChangeMethod, EventResource, VectorChangeObject};

/// One change-feed page split by status
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedPage {
    /// Bare provider ids of cancelled items.
    pub deletes: Vec<String>,
    pub upserts: Vec<EventResource>,
    /// One entry per input item, in feed order.
    pub vector_changes: Vec<VectorChangeObject>,
}

impl ClassifiedPage {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.upserts.is_empty()
    }
}

/// Classify every item exactly once: cancelled items become deletions,
/// everything else an upsert.
pub fn classify_page(items: Vec<EventResource>, calendar_id: &str) -> ClassifiedPage {
    let mut page = ClassifiedPage {
        deletes: Vec::new(),
        upserts: Vec::new(),
        vector_changes: Vec::with_capacity(items.len()),
    };

    for item in items {
        let method = if item.is_cancelled() { ChangeMethod::Delete } else { ChangeMethod::Upsert };
        page.vector_changes.push(VectorChangeObject {
            method,
            event: item.clone(),
            calendar_id: calendar_id.to_string(),
        });

        match ChangeEvent::classify(item) {
            ChangeEvent::Delete { id } => page.deletes.push(id),
            ChangeEvent::Upsert(resource) => page.upserts.push(resource),
        }
    }

    page
}
