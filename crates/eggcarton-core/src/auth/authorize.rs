//! Authorization request construction

use url::Url;

use super::pkce::CHALLENGE_METHOD;

/// Scopes requested on every login
pub const SCOPES: &[&str] = &["openid", "email", "profile"];

/// Everything the provider's authorize endpoint needs for one login attempt.
///
/// Carries the challenge, never the verifier.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    endpoint: Url,
    client_id: String,
    redirect_uri: String,
    code_challenge: String,
}

impl AuthorizationRequest {
    pub fn new(
        endpoint: Url,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        code_challenge: impl Into<String>,
    ) -> Self {
        Self {
            endpoint,
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            code_challenge: code_challenge.into(),
        }
    }

    /// Full authorization URL.
    ///
    /// Parameters are form-encoded and always appended in the same order.
    /// Query parameters already present on the endpoint are kept.
    pub fn to_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", &SCOPES.join(" "))
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("code_challenge", &self.code_challenge)
            .append_pair("code_challenge_method", CHALLENGE_METHOD);
        url
    }
}

/// Build the authorization URL the user opens in their browser
pub fn build_authorization_url(
    endpoint: &Url,
    client_id: &str,
    redirect_uri: &str,
    code_challenge: &str,
) -> String {
    AuthorizationRequest::new(endpoint.clone(), client_id, redirect_uri, code_challenge)
        .to_url()
        .to_string()
}
