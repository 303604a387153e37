//! Error types for the login flow and session handling
//!
//! Each component owns its error enum. `LoginError` tags which step of the
//! flow failed and keeps the original error as its source.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::credentials::CredentialError;

/// The OS random source could not be read
#[derive(Debug, Error)]
#[error("secure random source unavailable")]
pub struct EntropyError(#[from] rand::Error);

/// Callback listener outcomes other than a usable authorization code
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("failed to bind callback listener on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("no callback received within {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("login cancelled")]
    Cancelled,

    #[error("provider returned an error: {0}")]
    ProviderError(String),

    #[error("callback carried neither an authorization code nor an error")]
    MissingCode,

    #[error("callback listener stopped unexpectedly: {0}")]
    ListenerFailed(String),

    #[error("callback port {0} is still bound after shutdown")]
    PortNotReleased(SocketAddr),
}

impl FlowError {
    /// Timeout or explicit cancel, as opposed to a failed authentication
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FlowError::Timeout(_) | FlowError::Cancelled)
    }
}

/// Token endpoint failures
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("token request failed")]
    Network(#[from] reqwest::Error),

    #[error("token endpoint rejected the request (status {status}): {body}")]
    ProviderRejected { status: u16, body: String },

    #[error("malformed token response")]
    MalformedResponse(#[source] serde_json::Error),
}

/// A failed login, tagged with the step that failed
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("failed to generate PKCE challenge")]
    Entropy(#[from] EntropyError),

    #[error("authentication failed")]
    Callback(#[from] FlowError),

    #[error("failed to exchange code for tokens")]
    Exchange(#[from] ExchangeError),
}

impl LoginError {
    /// One-line summary for the terminal
    pub fn user_message(&self) -> String {
        match self {
            LoginError::Entropy(_) => {
                "Could not generate a secure login challenge; aborting.".to_string()
            }
            LoginError::Callback(e) if e.is_cancellation() => {
                format!("Authentication cancelled: {e}. Run 'egg login' to try again.")
            }
            LoginError::Callback(e) => {
                format!("Authentication failed: {e}. Run 'egg login' to try again.")
            }
            LoginError::Exchange(e) => format!("Token exchange failed: {e}"),
        }
    }
}

/// Failures while producing a valid session for a command
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("you are not logged in, run 'egg login' to authenticate")]
    NotLoggedIn,

    #[error("session expired and no refresh token is stored, run 'egg login' to re-authenticate")]
    NoRefreshToken,

    #[error("session refresh failed, run 'egg login' to re-authenticate")]
    RefreshFailed(#[source] ExchangeError),

    #[error("failed to access stored credentials")]
    Storage(#[from] CredentialError),
}

/// Access token could not be projected to an owner id
#[derive(Debug, Error)]
pub enum ClaimsError {
    #[error("invalid JWT token format")]
    MalformedToken,

    #[error("failed to decode JWT payload")]
    Decode(#[from] base64::DecodeError),

    #[error("failed to parse JWT claims")]
    Parse(#[from] serde_json::Error),

    #[error("sub claim not found in token")]
    MissingSubject,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_classification() {
        assert!(FlowError::Timeout(Duration::from_secs(1)).is_cancellation());
        assert!(FlowError::Cancelled.is_cancellation());
        assert!(!FlowError::MissingCode.is_cancellation());
        assert!(!FlowError::ProviderError("access_denied".into()).is_cancellation());
    }

    #[test]
    fn test_user_message_names_cause() {
        let err = LoginError::from(FlowError::ProviderError("access_denied".into()));
        let msg = err.user_message();
        assert!(msg.starts_with("Authentication failed"));
        assert!(msg.contains("access_denied"));

        let err = LoginError::from(FlowError::Timeout(Duration::from_secs(300)));
        assert!(err.user_message().starts_with("Authentication cancelled"));

        let err = LoginError::from(ExchangeError::ProviderRejected {
            status: 400,
            body: r#"{"error":"invalid_grant"}"#.into(),
        });
        let msg = err.user_message();
        assert!(msg.contains("400"));
        assert!(msg.contains("invalid_grant"));
    }

    #[test]
    fn test_login_error_keeps_source() {
        use std::error::Error as _;

        let err = LoginError::from(FlowError::MissingCode);
        let source = err.source().expect("source");
        assert_eq!(
            source.to_string(),
            "callback carried neither an authorization code nor an error"
        );
    }
}
