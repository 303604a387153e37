//! Token endpoint client
//!
//! Form-encoded POSTs for the authorization-code and refresh grants.

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::callback::AuthorizationCode;
use super::error::ExchangeError;
use super::types::TokenBundle;

/// Token endpoint response as sent on the wire
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default = "default_token_type")]
    token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    fn into_bundle(self, issued_at: i64) -> TokenBundle {
        TokenBundle {
            access_token: self.access_token,
            id_token: self.id_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            token_type: self.token_type,
            expires_in: self.expires_in,
            issued_at,
        }
    }
}

/// Exchanges authorization codes and refresh tokens for token bundles
#[derive(Clone)]
pub struct TokenExchanger {
    client: reqwest::Client,
}

impl TokenExchanger {
    /// Exchanger whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, ExchangeError> {
        Self::from_builder(reqwest::Client::builder(), timeout)
    }

    /// Finish `builder` with the request timeout applied
    pub fn from_builder(
        builder: reqwest::ClientBuilder,
        timeout: Duration,
    ) -> Result<Self, ExchangeError> {
        let client = builder
            .timeout(timeout)
            .build()
            .map_err(ExchangeError::Client)?;
        Ok(Self { client })
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Redeem an authorization code together with its PKCE verifier
    pub async fn exchange_code(
        &self,
        token_endpoint: &Url,
        client_id: &str,
        code: &AuthorizationCode,
        redirect_uri: &str,
        verifier: &str,
    ) -> Result<TokenBundle, ExchangeError> {
        debug!("Exchanging authorization code at {}", token_endpoint);

        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", client_id),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri),
            ("code_verifier", verifier),
        ];

        let bundle = self.post_form(token_endpoint, &params).await?;
        info!("Authorization code exchanged for tokens");
        Ok(bundle)
    }

    /// Obtain a fresh access token.
    ///
    /// Providers that do not rotate refresh tokens omit it from the response;
    /// the returned bundle then keeps the one that was used.
    pub async fn refresh(
        &self,
        token_endpoint: &Url,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<TokenBundle, ExchangeError> {
        debug!("Refreshing access token at {}", token_endpoint);

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("refresh_token", refresh_token),
        ];

        let mut bundle = self.post_form(token_endpoint, &params).await?;
        if bundle.refresh_token.is_none() {
            bundle.refresh_token = Some(refresh_token.to_string());
        }
        Ok(bundle)
    }

    async fn post_form(
        &self,
        token_endpoint: &Url,
        params: &[(&str, &str)],
    ) -> Result<TokenBundle, ExchangeError> {
        let response = self
            .client
            .post(token_endpoint.clone())
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ExchangeError::ProviderRejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(ExchangeError::MalformedResponse)?;

        Ok(parsed.into_bundle(Utc::now().timestamp()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn exchanger() -> TokenExchanger {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        TokenExchanger::with_client(client)
    }

    fn token_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/oauth2/token", server.uri())).unwrap()
    }

    fn code(value: &str) -> AuthorizationCode {
        AuthorizationCode::new(value)
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("client_id=abc"))
            .and(body_string_contains("code=xyz"))
            .and(body_string_contains(
                "redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fcallback",
            ))
            .and(body_string_contains("code_verifier=verifier-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at",
                "id_token": "it",
                "refresh_token": "rt",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let before = Utc::now().timestamp();
        let bundle = exchanger()
            .exchange_code(
                &token_url(&server),
                "abc",
                &code("xyz"),
                "http://localhost:8080/callback",
                "verifier-123",
            )
            .await
            .unwrap();
        let after = Utc::now().timestamp();

        assert_eq!(bundle.access_token, "at");
        assert_eq!(bundle.id_token, "it");
        assert_eq!(bundle.refresh_token.as_deref(), Some("rt"));
        assert_eq!(bundle.expires_in, 3600);
        assert_eq!(bundle.token_type, "Bearer");
        assert!(bundle.issued_at >= before && bundle.issued_at <= after);
    }

    #[tokio::test]
    async fn test_exchange_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .mount(&server)
            .await;

        let result = exchanger()
            .exchange_code(
                &token_url(&server),
                "abc",
                &code("stale"),
                "http://localhost:8080/callback",
                "v",
            )
            .await;

        match result {
            Err(ExchangeError::ProviderRejected { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_endpoint_hits_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(serde_json::json!({
                        "access_token": "at",
                        "expires_in": 3600
                    })),
            )
            .mount(&server)
            .await;

        let exchanger = TokenExchanger::from_builder(
            reqwest::Client::builder().no_proxy(),
            Duration::from_millis(100),
        )
        .unwrap();

        let started = std::time::Instant::now();
        let result = exchanger
            .exchange_code(&token_url(&server), "abc", &code("c"), "http://x", "v")
            .await;

        assert!(matches!(result, Err(ExchangeError::Network(ref e)) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_millis(450));
    }

    #[test]
    fn test_new_builds_client() {
        assert!(TokenExchanger::new(Duration::from_secs(10)).is_ok());
    }

    #[tokio::test]
    async fn test_exchange_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"nope"}"#))
            .mount(&server)
            .await;

        let result = exchanger()
            .exchange_code(&token_url(&server), "abc", &code("c"), "http://x", "v")
            .await;
        assert!(matches!(result, Err(ExchangeError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_exchange_network_error() {
        // Nothing listens on the discard port
        let url = Url::parse("http://127.0.0.1:9/oauth2/token").unwrap();
        let result = exchanger()
            .exchange_code(&url, "abc", &code("c"), "http://x", "v")
            .await;
        assert!(matches!(result, Err(ExchangeError::Network(_))));
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-rt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-at",
                "id_token": "new-it",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let bundle = exchanger()
            .refresh(&token_url(&server), "abc", "old-rt")
            .await
            .unwrap();

        assert_eq!(bundle.access_token, "new-at");
        assert_eq!(bundle.refresh_token.as_deref(), Some("old-rt"));
    }

    #[tokio::test]
    async fn test_refresh_takes_rotated_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-at",
                "refresh_token": "new-rt",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let bundle = exchanger()
            .refresh(&token_url(&server), "abc", "old-rt")
            .await
            .unwrap();

        assert_eq!(bundle.refresh_token.as_deref(), Some("new-rt"));
        assert_eq!(bundle.token_type, "Bearer");
        assert_eq!(bundle.id_token, "");
    }
}
