//! Calendar provider port interfaces

use async_trait::async_trait;
use calsync_domain::{
    CalendarAccount, ChangePage, ChangeRequest, ColorPalette, ConferenceRow, Result, WatchResponse,
};

/// Authenticated access to the external calendar's change feed and push
/// notification channels.
///
/// Implementations must report a stale sync token as
/// [`CalSyncError::CursorInvalidated`](calsync_domain::CalSyncError::CursorInvalidated)
/// and revoked consent as
/// [`CalSyncError::SyncDisabled`](calsync_domain::CalSyncError::SyncDisabled).
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Fetch one page of the change feed.
    async fn list_changes(
        &self,
        account: &CalendarAccount,
        calendar_id: &str,
        request: &ChangeRequest,
    ) -> Result<ChangePage>;

    /// Open a push-notification channel for the calendar.
    async fn watch(
        &self,
        account: &CalendarAccount,
        calendar_id: &str,
        channel_id: &str,
        token: &str,
    ) -> Result<WatchResponse>;

    /// Stop a previously opened channel.
    async fn stop_watch(
        &self,
        account: &CalendarAccount,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<()>;

    /// Fetch the provider's event colour palette.
    async fn colors(&self, account: &CalendarAccount) -> Result<ColorPalette>;
}

/// Supplies a valid bearer token for a calendar account, refreshing it when
/// the stored one is about to expire.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self, account: &CalendarAccount) -> Result<String>;
}

/// Tears down externally hosted conference resources (e.g. Zoom meetings)
/// before their conference rows are removed.
#[async_trait]
pub trait ConferenceDeprovisioner: Send + Sync {
    async fn deprovision(&self, user_id: &str, conference: &ConferenceRow) -> Result<()>;
}
