//! OAuth access tokens for Google Calendar
//!
//! Tokens come from the user's stored integration. An expired token (or one
//! within [`TOKEN_EXPIRY_SKEW_SECS`] of expiring) is refreshed against the
//! token endpoint, written back to the integration, and cached in memory.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calsync_core::sync::ports::IntegrationRepository;
use calsync_core::AccessTokenSource;
use calsync_domain::constants::{GOOGLE_CALENDAR_RESOURCE, TOKEN_EXPIRY_SKEW_SECS};
use calsync_domain::{
    CalSyncError, CalendarAccount, ClientType, GoogleConfig, OAuthClientConfig, Result,
};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use reqwest::Method;
use tracing::{debug, info, instrument, warn};

use super::types::{TokenErrorResponse, TokenResponse};
use crate::errors::status_error;
use crate::http::client::decode_json;
use crate::http::HttpClient;

const CACHE_CAPACITY: u64 = 10_000;
const CACHE_TTL: Duration = Duration::from_secs(3_600);

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        is_fresh(self.expires_at, now)
    }
}

fn is_fresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at - chrono::Duration::seconds(TOKEN_EXPIRY_SKEW_SECS) > now
}

pub struct GoogleTokenSource {
    integrations: Arc<dyn IntegrationRepository>,
    http: HttpClient,
    token_url: String,
    clients: HashMap<ClientType, OAuthClientConfig>,
    cache: Cache<String, CachedToken>,
}

impl GoogleTokenSource {
    pub fn new(
        integrations: Arc<dyn IntegrationRepository>,
        http: HttpClient,
        config: &GoogleConfig,
    ) -> Self {
        Self {
            integrations,
            http,
            token_url: config.token_url.clone(),
            clients: config.clients.clone(),
            cache: Cache::builder().max_capacity(CACHE_CAPACITY).time_to_live(CACHE_TTL).build(),
        }
    }

    /// Drop the cached token for a user, e.g. after the provider rejected it.
    pub async fn invalidate(&self, user_id: &str) {
        self.cache.invalidate(user_id).await;
    }

    async fn refresh(
        &self,
        client_type: ClientType,
        refresh_token: &str,
    ) -> Result<(String, DateTime<Utc>)> {
        let client = self.clients.get(&client_type).ok_or_else(|| {
            CalSyncError::Config(format!(
                "no OAuth client configured for client type {}",
                client_type.as_str()
            ))
        })?;

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client.client_id.as_str()),
        ];
        // Installed-app clients (ios, android) have no secret.
        if !client.client_secret.is_empty() {
            form.push(("client_secret", client.client_secret.as_str()));
        }

        let request = self.http.request(Method::POST, &self.token_url).form(&form);
        let response = self.http.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(refresh_error(status, &body));
        }

        let token: TokenResponse = decode_json(response).await?;
        let expires_at = Utc::now() + chrono::Duration::seconds(token.expires_in);
        Ok((token.access_token, expires_at))
    }
}

#[async_trait]
impl AccessTokenSource for GoogleTokenSource {
    #[instrument(skip(self, account), fields(user_id = %account.user_id))]
    async fn access_token(&self, account: &CalendarAccount) -> Result<String> {
        let now = Utc::now();
        if let Some(cached) = self.cache.get(&account.user_id).await {
            if cached.is_fresh(now) {
                return Ok(cached.access_token);
            }
        }

        let integration = self
            .integrations
            .find_integration_for_user(&account.user_id, GOOGLE_CALENDAR_RESOURCE)
            .await?
            .ok_or_else(|| {
                CalSyncError::NotFound(format!(
                    "google calendar integration for user {}",
                    account.user_id
                ))
            })?;

        match (&integration.access_token, integration.expires_at) {
            (Some(token), Some(expires_at)) if is_fresh(expires_at, now) => {
                let cached = CachedToken { access_token: token.clone(), expires_at };
                self.cache.insert(account.user_id.clone(), cached).await;
                return Ok(token.clone());
            }
            (Some(token), None) if integration.refresh_token.is_none() => {
                debug!("stored token has no expiry and cannot be refreshed; using as is");
                return Ok(token.clone());
            }
            _ => {}
        }

        let refresh_token = integration.refresh_token.as_deref().ok_or_else(|| {
            CalSyncError::Auth(format!("integration {} has no refresh token", integration.id))
        })?;
        let (access_token, expires_at) = self.refresh(account.client_type, refresh_token).await?;

        self.integrations.update_access_token(&integration.id, &access_token, expires_at).await?;
        self.cache
            .insert(
                account.user_id.clone(),
                CachedToken { access_token: access_token.clone(), expires_at },
            )
            .await;
        info!(integration_id = %integration.id, %expires_at, "access token refreshed");
        Ok(access_token)
    }
}

/// A revoked or expired grant disables sync; anything else follows the
/// usual status mapping.
fn refresh_error(status: reqwest::StatusCode, body: &str) -> CalSyncError {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(err) if err.error == "invalid_grant" => {
            warn!(%status, "refresh token rejected");
            CalSyncError::SyncDisabled(format!(
                "refresh token rejected: {}",
                err.error_description.unwrap_or(err.error)
            ))
        }
        _ => status_error(status, body),
    }
}

#[cfg(test)]
mod tests {
    use calsync_domain::CalendarIntegration;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::database::{DbManager, SqliteIntegrationRepository};

    struct Fixture {
        _dir: TempDir,
        repo: Arc<SqliteIntegrationRepository>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = DbManager::new(dir.path().join("tokens.db"), 2).unwrap();
        db.run_migrations().unwrap();
        Fixture { _dir: dir, repo: Arc::new(SqliteIntegrationRepository::new(Arc::new(db))) }
    }

    fn integration(access: Option<&str>, expires_at: Option<DateTime<Utc>>) -> CalendarIntegration {
        CalendarIntegration {
            id: "int-1".into(),
            user_id: "user-1".into(),
            resource: GOOGLE_CALENDAR_RESOURCE.into(),
            client_type: Some(ClientType::Web),
            sync_enabled: true,
            access_token: access.map(str::to_string),
            refresh_token: Some("refresh-1".into()),
            expires_at,
        }
    }

    fn source(repo: Arc<SqliteIntegrationRepository>, token_url: String) -> GoogleTokenSource {
        let mut config = GoogleConfig { token_url, ..GoogleConfig::default() };
        config.clients.insert(
            ClientType::Web,
            OAuthClientConfig { client_id: "web-id".into(), client_secret: "web-secret".into() },
        );
        config.clients.insert(
            ClientType::Ios,
            OAuthClientConfig { client_id: "ios-id".into(), ..Default::default() },
        );
        let http = HttpClient::builder().max_attempts(1).build().unwrap();
        GoogleTokenSource::new(repo, http, &config)
    }

    fn account(client_type: ClientType) -> CalendarAccount {
        CalendarAccount { user_id: "user-1".into(), client_type }
    }

    #[tokio::test]
    async fn fresh_stored_token_is_used_without_refresh() {
        let server = MockServer::start().await;
        let fx = fixture();
        let expires_at = Utc::now() + chrono::Duration::hours(1);
        fx.repo.save_integration(&integration(Some("stored"), Some(expires_at))).await.unwrap();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let tokens = source(fx.repo.clone(), format!("{}/token", server.uri()));

        assert_eq!(tokens.access_token(&account(ClientType::Web)).await.unwrap(), "stored");
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_persisted_and_cached() {
        let server = MockServer::start().await;
        let fx = fixture();
        let expires_at = Utc::now() + chrono::Duration::seconds(30);
        fx.repo.save_integration(&integration(Some("old"), Some(expires_at))).await.unwrap();
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("client_secret=web-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = source(fx.repo.clone(), format!("{}/token", server.uri()));

        assert_eq!(tokens.access_token(&account(ClientType::Web)).await.unwrap(), "new");
        assert_eq!(tokens.access_token(&account(ClientType::Web)).await.unwrap(), "new");

        let stored = fx.repo.find_integration("int-1").await.unwrap().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("new"));
        assert!(stored.expires_at.unwrap() > Utc::now() + chrono::Duration::minutes(50));
    }

    #[tokio::test]
    async fn mobile_clients_refresh_without_a_secret() {
        let server = MockServer::start().await;
        let fx = fixture();
        fx.repo.save_integration(&integration(None, None)).await.unwrap();
        Mock::given(method("POST"))
            .and(body_string_contains("client_id=ios-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ios-token",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let tokens = source(fx.repo.clone(), format!("{}/token", server.uri()));
        tokens.access_token(&account(ClientType::Ios)).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(!body.contains("client_secret"));
    }

    #[tokio::test]
    async fn invalid_grant_disables_sync() {
        let server = MockServer::start().await;
        let fx = fixture();
        fx.repo.save_integration(&integration(None, None)).await.unwrap();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let tokens = source(fx.repo.clone(), format!("{}/token", server.uri()));
        let err = tokens.access_token(&account(ClientType::Web)).await.unwrap_err();

        assert!(matches!(err, CalSyncError::SyncDisabled(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn missing_integration_and_client_config_are_reported() {
        let server = MockServer::start().await;
        let fx = fixture();
        let tokens = source(fx.repo.clone(), format!("{}/token", server.uri()));

        assert!(matches!(
            tokens.access_token(&account(ClientType::Web)).await.unwrap_err(),
            CalSyncError::NotFound(_)
        ));

        fx.repo.save_integration(&integration(None, None)).await.unwrap();
        assert!(matches!(
            tokens.access_token(&account(ClientType::Android)).await.unwrap_err(),
            CalSyncError::Config(_)
        ));
    }
}
