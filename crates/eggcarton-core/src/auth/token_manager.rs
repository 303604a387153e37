//! Token management with automatic refresh
//!
//! Hands out a valid bundle for API calls, refreshing and persisting it when
//! the stored one is inside the expiry margin.

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use super::error::SessionError;
use super::exchange::TokenExchanger;
use super::lifecycle;
use super::types::TokenBundle;
use crate::credentials::CredentialStore;

pub struct TokenManager {
    store: CredentialStore,
    exchanger: TokenExchanger,
    token_url: Url,
    client_id: String,
}

impl TokenManager {
    pub fn new(
        store: CredentialStore,
        exchanger: TokenExchanger,
        token_url: Url,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            exchanger,
            token_url,
            client_id: client_id.into(),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Get a valid bundle, refreshing it if needed
    pub async fn valid_bundle(&self) -> Result<TokenBundle, SessionError> {
        let Some(bundle) = self.store.load().await? else {
            return Err(SessionError::NotLoggedIn);
        };

        if lifecycle::is_valid(&bundle, Utc::now().timestamp()) {
            debug!("Stored session still valid");
            return Ok(bundle);
        }

        let Some(refresh_token) = bundle.refresh_token.as_deref().filter(|t| !t.is_empty())
        else {
            warn!("Session expired and no refresh token is stored");
            return Err(SessionError::NoRefreshToken);
        };

        info!("Session expired, refreshing");
        let refreshed = self
            .exchanger
            .refresh(&self.token_url, &self.client_id, refresh_token)
            .await
            .map_err(SessionError::RefreshFailed)?;

        self.store.save(&refreshed).await?;
        Ok(refreshed)
    }

    /// Whether a stored bundle exists and is currently valid, without refreshing
    pub async fn has_valid_session(&self) -> Result<bool, SessionError> {
        Ok(self
            .store
            .load()
            .await?
            .is_some_and(|bundle| lifecycle::is_valid(&bundle, Utc::now().timestamp())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::ExchangeError;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bundle(issued_at: i64, refresh_token: Option<&str>) -> TokenBundle {
        TokenBundle {
            access_token: "old-at".to_string(),
            id_token: String::new(),
            refresh_token: refresh_token.map(str::to_string),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            issued_at,
        }
    }

    fn manager(dir: &TempDir, server: &MockServer) -> TokenManager {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        TokenManager::new(
            CredentialStore::new(dir.path().join("credentials.json")),
            TokenExchanger::with_client(client),
            Url::parse(&format!("{}/oauth2/token", server.uri())).unwrap(),
            "abc",
        )
    }

    #[tokio::test]
    async fn test_not_logged_in() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let result = manager(&dir, &server).valid_bundle().await;
        assert!(matches!(result, Err(SessionError::NotLoggedIn)));
    }

    #[tokio::test]
    async fn test_valid_bundle_returned_without_refresh() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let manager = manager(&dir, &server);
        let fresh = bundle(Utc::now().timestamp(), Some("rt"));
        manager.store().save(&fresh).await.unwrap();

        assert_eq!(manager.valid_bundle().await.unwrap(), fresh);
        assert!(manager.has_valid_session().await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_bundle_is_refreshed_and_saved() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-at",
                "id_token": "new-it",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager(&dir, &server);
        manager
            .store()
            .save(&bundle(Utc::now().timestamp() - 7200, Some("rt")))
            .await
            .unwrap();
        assert!(!manager.has_valid_session().await.unwrap());

        let refreshed = manager.valid_bundle().await.unwrap();
        assert_eq!(refreshed.access_token, "new-at");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("rt"));

        let stored = manager.store().load().await.unwrap().unwrap();
        assert_eq!(stored, refreshed);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let manager = manager(&dir, &server);
        manager
            .store()
            .save(&bundle(Utc::now().timestamp() - 7200, None))
            .await
            .unwrap();

        let result = manager.valid_bundle().await;
        assert!(matches!(result, Err(SessionError::NoRefreshToken)));
    }

    #[tokio::test]
    async fn test_refresh_rejected_keeps_old_bundle() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .mount(&server)
            .await;

        let manager = manager(&dir, &server);
        let expired = bundle(Utc::now().timestamp() - 7200, Some("rt"));
        manager.store().save(&expired).await.unwrap();

        let result = manager.valid_bundle().await;
        assert!(matches!(
            result,
            Err(SessionError::RefreshFailed(ExchangeError::ProviderRejected {
                status: 400,
                ..
            }))
        ));
        assert_eq!(manager.store().load().await.unwrap().unwrap(), expired);
    }
}
