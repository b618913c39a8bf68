//! Fan-out persistence coordinator
//!
//! Applies one classified page to the record store. Deletes run before
//! upserts. Within the delete path, attendees and reminders go first, then the
//! event rows, then the conferences and scheduling-assist records the deleted
//! rows referenced. Within the upsert path, conferences go first, then the
//! reminder replace and attendee upsert in parallel, then the event rows.
//!
//! Sub-entity failures are collected into a [`FanoutReport`] and logged. Only
//! an event upsert failure aborts the page.

use std::collections::BTreeSet;
use std::sync::Arc;

use calsync_domain::{
    composite_key, CalSyncError, ColorPalette, EventResource, EventRow, Result,
};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, instrument, warn};

use super::mapping::{attendee_rows, conference_row, event_row, reminder_rows};
use super::ports::RecordStore;
use crate::calendar_ports::ConferenceDeprovisioner;

/// A record store sub-operation that failed without aborting the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutFailure {
    pub operation: &'static str,
    pub error: CalSyncError,
}

/// Outcome of applying one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub deleted_events: usize,
    pub upserted_events: usize,
    pub skipped_malformed: usize,
    pub failures: Vec<FanoutFailure>,
}

impl FanoutReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record<T>(&mut self, operation: &'static str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(operation, error = %error, "record store sub-operation failed");
                self.failures.push(FanoutFailure { operation, error });
                None
            }
        }
    }
}

/// Reconciles deletions and upserts across events and their dependents.
#[derive(Clone)]
pub struct FanoutCoordinator {
    store: RecordStore,
    deprovisioner: Arc<dyn ConferenceDeprovisioner>,
}

impl FanoutCoordinator {
    pub fn new(store: RecordStore, deprovisioner: Arc<dyn ConferenceDeprovisioner>) -> Self {
        Self { store, deprovisioner }
    }

    /// Apply a page's delete set, then its upsert set.
    #[instrument(
        skip(self, deletes, upserts, palette),
        fields(deletes = deletes.len(), upserts = upserts.len())
    )]
    pub async fn apply(
        &self,
        calendar_id: &str,
        user_id: &str,
        deletes: &[String],
        upserts: &[EventResource],
        palette: Option<&ColorPalette>,
    ) -> Result<FanoutReport> {
        let mut report = FanoutReport::default();

        self.apply_deletes(calendar_id, user_id, deletes, &mut report).await;
        self.apply_upserts(calendar_id, user_id, upserts, palette, &mut report).await?;

        if !report.is_clean() {
            warn!(
                calendar_id,
                failures = report.failures.len(),
                "page applied with partial fan-out failures"
            );
        }

        Ok(report)
    }

    async fn apply_deletes(
        &self,
        calendar_id: &str,
        user_id: &str,
        deletes: &[String],
        report: &mut FanoutReport,
    ) {
        let keys: Vec<String> = deletes
            .iter()
            .filter(|id| !id.trim().is_empty())
            .map(|id| composite_key(id, calendar_id))
            .collect();
        if keys.is_empty() {
            return;
        }

        let (attendees, reminders) = futures::join!(
            self.store.attendees.delete_attendees_for_events(&keys),
            self.store.reminders.delete_reminders_for_events(user_id, &keys),
        );
        report.record("delete_attendees", attendees);
        report.record("delete_reminders", reminders);

        let deleted_events = self.store.events.delete_events(&keys).await;
        let Some(deleted) = report.record("delete_events", deleted_events) else {
            return;
        };
        report.deleted_events = deleted.len();

        let conference_ids: Vec<String> = deleted
            .iter()
            .filter_map(|row| row.conference_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let meeting_ids: Vec<String> = deleted
            .iter()
            .filter_map(|row| row.meeting_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let (conferences, assists) = futures::join!(
            self.remove_conferences(user_id, &conference_ids),
            async {
                if meeting_ids.is_empty() {
                    return Ok(0);
                }
                self.store.meeting_assists.delete_meeting_assists(&meeting_ids).await
            },
        );
        for failure in conferences {
            report.failures.push(failure);
        }
        report.record("delete_meeting_assists", assists);

        debug!(calendar_id, deleted = report.deleted_events, "delete set applied");
    }

    /// Deprovision hosted conferences, then drop the rows.
    async fn remove_conferences(&self, user_id: &str, ids: &[String]) -> Vec<FanoutFailure> {
        let mut failures = Vec::new();
        if ids.is_empty() {
            return failures;
        }

        match self.store.conferences.find_conferences(ids).await {
            Ok(conferences) => {
                for conference in conferences.iter().filter(|c| c.is_host) {
                    if let Err(error) = self.deprovisioner.deprovision(user_id, conference).await {
                        warn!(
                            conference_id = %conference.id,
                            error = %error,
                            "failed to deprovision hosted conference"
                        );
                        failures.push(FanoutFailure { operation: "deprovision_conference", error });
                    }
                }
            }
            Err(error) => failures.push(FanoutFailure { operation: "find_conferences", error }),
        }

        if let Err(error) = self.store.conferences.delete_conferences(ids).await {
            failures.push(FanoutFailure { operation: "delete_conferences", error });
        }

        failures
    }

    async fn apply_upserts(
        &self,
        calendar_id: &str,
        user_id: &str,
        upserts: &[EventResource],
        palette: Option<&ColorPalette>,
        report: &mut FanoutReport,
    ) -> Result<()> {
        let persistable: Vec<&EventResource> =
            upserts.iter().filter(|event| event.is_persistable()).collect();
        report.skipped_malformed = upserts.len() - persistable.len();
        if report.skipped_malformed > 0 {
            debug!(
                calendar_id,
                skipped = report.skipped_malformed,
                "skipping events without id or timezone"
            );
        }
        if persistable.is_empty() {
            return Ok(());
        }

        let conferences: Vec<_> = persistable
            .iter()
            .filter_map(|event| conference_row(event, calendar_id, user_id))
            .collect();
        if !conferences.is_empty() {
            report.record(
                "upsert_conferences",
                self.store.conferences.upsert_conferences(&conferences).await,
            );
        }

        let event_keys: Vec<String> =
            persistable.iter().filter_map(|event| event.composite_key(calendar_id)).collect();
        let reminders: Vec<_> = persistable
            .iter()
            .flat_map(|event| reminder_rows(event, calendar_id, user_id))
            .collect();
        let attendees: Vec<_> = persistable
            .iter()
            .flat_map(|event| attendee_rows(event, calendar_id, user_id))
            .collect();

        let ((deleted_reminders, inserted_reminders), upserted_attendees) = futures::join!(
            async {
                let deleted =
                    self.store.reminders.delete_reminders_for_events(user_id, &event_keys).await;
                let inserted = if deleted.is_ok() && !reminders.is_empty() {
                    Some(self.store.reminders.insert_reminders(&reminders).await)
                } else {
                    None
                };
                (deleted, inserted)
            },
            async {
                if attendees.is_empty() {
                    return Ok(());
                }
                self.store.attendees.upsert_attendees(&attendees).await
            },
        );
        report.record("delete_reminders", deleted_reminders);
        if let Some(inserted) = inserted_reminders {
            report.record("insert_reminders", inserted);
        }
        report.record("upsert_attendees", upserted_attendees);

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let rows: Vec<EventRow> = persistable
            .iter()
            .filter_map(|event| event_row(event, calendar_id, user_id, palette, &now))
            .collect();
        self.store.events.upsert_events(&rows).await?;
        report.upserted_events = rows.len();

        debug!(calendar_id, upserted = rows.len(), "upsert set applied");
        Ok(())
    }
}
