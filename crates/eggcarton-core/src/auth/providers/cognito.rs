//! AWS Cognito hosted UI configuration
//!
//! Cognito exposes standard OAuth 2.0 endpoints under the user pool domain
//! and accepts public clients with PKCE. Refresh responses never carry a
//! new refresh token.

use crate::auth::types::OAuthSettings;

const AUTHORIZE_PATH: &str = "/oauth2/authorize";
const TOKEN_PATH: &str = "/oauth2/token";

/// A user pool domain such as `eggcarton.auth.us-east-1.amazoncognito.com`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CognitoDomain(String);

impl CognitoDomain {
    /// Accepts a bare host or a full `https://` origin
    pub fn new(domain: &str) -> Self {
        let host = domain
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        Self(host.to_string())
    }

    pub fn host(&self) -> &str {
        &self.0
    }

    pub fn authorization_url(&self) -> String {
        format!("https://{}{}", self.0, AUTHORIZE_PATH)
    }

    pub fn token_url(&self) -> String {
        format!("https://{}{}", self.0, TOKEN_PATH)
    }
}

/// Get the OAuth settings for a Cognito app client
pub fn cognito_settings(domain: &str, client_id: &str) -> Result<OAuthSettings, url::ParseError> {
    let domain = CognitoDomain::new(domain);
    if domain.host().is_empty() {
        return Err(url::ParseError::EmptyHost);
    }
    OAuthSettings::new(client_id, &domain.authorization_url(), &domain.token_url())
}
