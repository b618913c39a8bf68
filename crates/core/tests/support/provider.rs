//! Scripted provider gateway, conference deprovisioner, and publisher fakes

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use calsync_core::{ConferenceDeprovisioner, ProviderGateway, VectorChangePublisher};
use calsync_domain::{
    CalSyncError, CalendarAccount, ChangePage, ChangeRequest, ColorPalette, ConferenceRow,
    Result, VectorChangeObject, WatchResponse,
};

use super::store::Journal;

/// Gateway that replays a queue of change-feed responses.
///
/// Once the script is exhausted every call returns an empty final page with
/// the sync token `"exhausted"`.
#[derive(Default)]
pub struct ScriptedGateway {
    responses: Mutex<VecDeque<Result<ChangePage>>>,
    requests: Mutex<Vec<ChangeRequest>>,
    journal: Journal,
    fail_watch: AtomicBool,
    fail_stop: AtomicBool,
    stop_not_found: AtomicBool,
    watches: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new(journal: Journal) -> Arc<Self> {
        Arc::new(Self { journal, ..Default::default() })
    }

    pub fn push_page(&self, page: ChangePage) {
        self.responses.lock().unwrap().push_back(Ok(page));
    }

    pub fn push_error(&self, error: CalSyncError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn fail_watch(&self) {
        self.fail_watch.store(true, Ordering::SeqCst);
    }

    pub fn fail_stop(&self) {
        self.fail_stop.store(true, Ordering::SeqCst);
    }

    /// Make `stop_watch` report the channel as already gone.
    pub fn stop_not_found(&self) {
        self.stop_not_found.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<ChangeRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Channel ids passed to `watch`.
    pub fn watches(&self) -> Vec<String> {
        self.watches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderGateway for ScriptedGateway {
    async fn list_changes(
        &self,
        _account: &CalendarAccount,
        _calendar_id: &str,
        request: &ChangeRequest,
    ) -> Result<ChangePage> {
        self.requests.lock().unwrap().push(request.clone());
        self.journal.push("list_changes");
        self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(ChangePage {
                items: Vec::new(),
                next_page_token: None,
                next_sync_token: Some("exhausted".into()),
            })
        })
    }

    async fn watch(
        &self,
        _account: &CalendarAccount,
        calendar_id: &str,
        channel_id: &str,
        _token: &str,
    ) -> Result<WatchResponse> {
        self.journal.push(format!("watch:{channel_id}"));
        if self.fail_watch.load(Ordering::SeqCst) {
            return Err(CalSyncError::Provider("watch rejected".into()));
        }
        self.watches.lock().unwrap().push(channel_id.to_string());
        Ok(WatchResponse {
            resource_id: format!("res-{channel_id}"),
            resource_uri: format!("https://provider.test/calendars/{calendar_id}/events"),
            expiration: None,
        })
    }

    async fn stop_watch(
        &self,
        _account: &CalendarAccount,
        channel_id: &str,
        _resource_id: &str,
    ) -> Result<()> {
        self.journal.push(format!("stop_watch:{channel_id}"));
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(CalSyncError::Network("stop timed out".into()));
        }
        if self.stop_not_found.load(Ordering::SeqCst) {
            return Err(CalSyncError::NotFound(format!("channel {channel_id}")));
        }
        Ok(())
    }

    async fn colors(&self, _account: &CalendarAccount) -> Result<ColorPalette> {
        Ok(ColorPalette::default())
    }
}

#[derive(Default)]
pub struct RecordingDeprovisioner {
    journal: Journal,
    fail: AtomicBool,
}

impl RecordingDeprovisioner {
    pub fn new(journal: Journal) -> Arc<Self> {
        Arc::new(Self { journal, ..Default::default() })
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConferenceDeprovisioner for RecordingDeprovisioner {
    async fn deprovision(&self, _user_id: &str, conference: &ConferenceRow) -> Result<()> {
        self.journal.push(format!("deprovision:{}", conference.id));
        if self.fail.load(Ordering::SeqCst) {
            return Err(CalSyncError::Network("zoom unreachable".into()));
        }
        Ok(())
    }
}

/// Captures each published run instead of staging it.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, Vec<VectorChangeObject>)>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, Vec<VectorChangeObject>)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorChangePublisher for RecordingPublisher {
    async fn publish(
        &self,
        user_id: &str,
        changes: &[VectorChangeObject],
    ) -> Result<Option<String>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CalSyncError::Broker("broker unavailable".into()));
        }
        if changes.is_empty() {
            return Ok(None);
        }
        let mut published = self.published.lock().unwrap();
        published.push((user_id.to_string(), changes.to_vec()));
        Ok(Some(format!("{user_id}/batch-{}.json", published.len())))
    }
}
