//! OAuth types and data structures

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;

use super::callback::ListenerConfig;
use super::claims::owner_from_access_token;
use super::error::ClaimsError;
use super::lifecycle;

/// How long the user has to finish authenticating in the browser
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Upper bound on a single token endpoint round-trip
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Tokens issued by the identity provider, as persisted in the credential file.
///
/// Never mutated: a refresh produces a new bundle that replaces this one.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBundle {
    /// The access token used for API requests
    pub access_token: String,
    /// ID token (OpenID Connect)
    #[serde(default)]
    pub id_token: String,
    /// Refresh token for obtaining new access tokens
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_type: String,
    /// Lifetime in seconds, as reported by the provider
    pub expires_in: i64,
    /// Unix timestamp taken locally when the token response was received
    pub issued_at: i64,
}

impl TokenBundle {
    /// Unix timestamp at which the provider considers the token expired
    pub fn expires_at(&self) -> i64 {
        self.issued_at.saturating_add(self.expires_in)
    }

    /// Check validity against the given Unix time (skew margin applied)
    pub fn is_valid_at(&self, now: i64) -> bool {
        lifecycle::is_valid(self, now)
    }

    /// Check validity against the local clock
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now().timestamp())
    }

    /// Subject of the access token; recomputed on every call
    pub fn owner(&self) -> Result<String, ClaimsError> {
        owner_from_access_token(&self.access_token)
    }
}

impl std::fmt::Debug for TokenBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBundle")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("issued_at", &self.issued_at)
            .field("has_refresh_token", &lifecycle::can_refresh(self))
            .finish_non_exhaustive()
    }
}

/// Provider endpoints and local listener settings for one login flow.
///
/// Passed into [`super::LoginFlow`] explicitly so tests can point it at mocks.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    /// OAuth client ID (public client, no secret)
    pub client_id: String,
    /// Authorization endpoint URL
    pub authorization_endpoint: Url,
    /// Token endpoint URL
    pub token_endpoint: Url,
    /// Where the callback listener binds
    pub listener: ListenerConfig,
    pub login_timeout: Duration,
    pub http_timeout: Duration,
}

impl OAuthSettings {
    pub fn new(
        client_id: impl Into<String>,
        authorization_endpoint: &str,
        token_endpoint: &str,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            client_id: client_id.into(),
            authorization_endpoint: Url::parse(authorization_endpoint)?,
            token_endpoint: Url::parse(token_endpoint)?,
            listener: ListenerConfig::default(),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        })
    }

    pub fn with_listener(mut self, listener: ListenerConfig) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}
