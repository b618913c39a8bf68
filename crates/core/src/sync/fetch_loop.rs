//! Change-fetch loop
//!
//! Drives pagination against the provider gateway. Each iteration fetches a
//! page with the current cursor, classifies it, persists the advanced cursor
//! and only then applies the page through the fan-out coordinator. The vector
//! changes of every page are handed to the publisher once, after the last
//! page.

use std::sync::Arc;

use calsync_domain::{
    CalSyncError, CalendarAccount, ChangePage, ColorPalette, Result, SyncCursor,
    VectorChangeObject,
};
use tracing::{debug, error, info, instrument};

use super::classify::classify_page;
use super::fanout::FanoutCoordinator;
use super::ports::RecordStore;
use crate::calendar_ports::ProviderGateway;
use crate::index::ports::VectorChangePublisher;

/// What one completed run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Cursor persisted after the last page.
    pub cursor: SyncCursor,
    pub pages: usize,
    pub upserts: usize,
    pub deletes: usize,
    pub vector_changes: usize,
    pub skipped_malformed: usize,
    pub fanout_failures: usize,
    pub staged_batch: Option<String>,
    /// Set when the run applied but the enqueue step failed.
    pub enqueue_error: Option<CalSyncError>,
}

impl FetchOutcome {
    fn new(cursor: SyncCursor) -> Self {
        Self {
            cursor,
            pages: 0,
            upserts: 0,
            deletes: 0,
            vector_changes: 0,
            skipped_malformed: 0,
            fanout_failures: 0,
            staged_batch: None,
            enqueue_error: None,
        }
    }
}

pub struct ChangeFetchLoop {
    gateway: Arc<dyn ProviderGateway>,
    store: RecordStore,
    coordinator: FanoutCoordinator,
    publisher: Arc<dyn VectorChangePublisher>,
}

impl ChangeFetchLoop {
    pub fn new(
        gateway: Arc<dyn ProviderGateway>,
        store: RecordStore,
        coordinator: FanoutCoordinator,
        publisher: Arc<dyn VectorChangePublisher>,
    ) -> Self {
        Self { gateway, store, coordinator, publisher }
    }

    /// Fetch and apply every page reachable from `cursor`.
    ///
    /// # Errors
    /// Any gateway, cursor persistence, or event upsert failure aborts the run
    /// and leaves the last persisted cursor in place. A page's cursor is
    /// persisted before the page is applied. A stale sync token is
    /// surfaced as `CursorInvalidated` for the orchestrator to handle.
    #[instrument(
        skip(self, account, cursor, palette),
        fields(
            calendar_id = %cursor.calendar_id,
            user_id = %account.user_id,
            incremental = cursor.is_incremental()
        )
    )]
    pub async fn fetch_and_apply(
        &self,
        account: &CalendarAccount,
        cursor: SyncCursor,
        palette: Option<&ColorPalette>,
    ) -> Result<FetchOutcome> {
        let mut outcome = FetchOutcome::new(cursor);
        let mut changes: Vec<VectorChangeObject> = Vec::new();

        loop {
            let request = outcome.cursor.request();
            let page =
                self.gateway.list_changes(account, &outcome.cursor.calendar_id, &request).await?;

            if page.next_page_token.is_some() && page.next_page_token == request.page_token {
                return Err(CalSyncError::Provider(
                    "provider returned the same page token twice".into(),
                ));
            }

            let more = self.apply_page(page, palette, &mut outcome, &mut changes).await?;
            if !more {
                break;
            }
        }

        outcome.vector_changes = changes.len();
        match self.publisher.publish(&account.user_id, &changes).await {
            Ok(staged) => outcome.staged_batch = staged,
            Err(err) => {
                error!(
                    calendar_id = %outcome.cursor.calendar_id,
                    changes = changes.len(),
                    error = %err,
                    "failed to enqueue vector changes; record store changes kept"
                );
                outcome.enqueue_error = Some(err);
            }
        }

        info!(
            calendar_id = %outcome.cursor.calendar_id,
            pages = outcome.pages,
            upserts = outcome.upserts,
            deletes = outcome.deletes,
            vector_changes = outcome.vector_changes,
            "change feed applied"
        );

        Ok(outcome)
    }

    /// Persist the advanced cursor, then apply the page. Returns whether
    /// another page follows.
    async fn apply_page(
        &self,
        page: ChangePage,
        palette: Option<&ColorPalette>,
        outcome: &mut FetchOutcome,
        changes: &mut Vec<VectorChangeObject>,
    ) -> Result<bool> {
        let next = outcome.cursor.advance(&page);
        let calendar_id = outcome.cursor.calendar_id.clone();
        let user_id = outcome.cursor.user_id.clone();

        let classified = classify_page(page.items, &calendar_id);
        debug!(
            calendar_id = %calendar_id,
            page = outcome.pages + 1,
            upserts = classified.upserts.len(),
            deletes = classified.deletes.len(),
            "classified change page"
        );
        changes.extend(classified.vector_changes);

        self.store.cursors.save_cursor(&next).await?;

        let report = self
            .coordinator
            .apply(&calendar_id, &user_id, &classified.deletes, &classified.upserts, palette)
            .await?;

        outcome.pages += 1;
        outcome.upserts += classified.upserts.len();
        outcome.deletes += classified.deletes.len();
        outcome.skipped_malformed += report.skipped_malformed;
        outcome.fanout_failures += report.failures.len();
        outcome.cursor = next;

        Ok(outcome.cursor.page_token.is_some())
    }
}
