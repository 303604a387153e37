//! Interactive OAuth PKCE login
//!
//! Ties the pieces together: challenge, callback listener, authorization URL,
//! browser hand-off and token exchange. Nothing is persisted here; the caller
//! decides what to do with the returned bundle.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::authorize::build_authorization_url;
use super::callback::CallbackListener;
use super::error::{ExchangeError, LoginError};
use super::exchange::TokenExchanger;
use super::pkce::PkceChallenge;
use super::types::{OAuthSettings, TokenBundle};

/// Shows the authorization URL to the user (opens a browser, prints it, ...)
pub trait UrlPresenter: Send + Sync {
    fn present(&self, url: &str);
}

/// One login attempt per call; each call binds its own listener
pub struct LoginFlow {
    settings: OAuthSettings,
    exchanger: TokenExchanger,
}

impl LoginFlow {
    /// Flow with an exchanger honouring `settings.http_timeout`
    pub fn new(settings: OAuthSettings) -> Result<Self, ExchangeError> {
        let exchanger = TokenExchanger::new(settings.http_timeout)?;
        Ok(Self::with_exchanger(settings, exchanger))
    }

    pub fn with_exchanger(settings: OAuthSettings, exchanger: TokenExchanger) -> Self {
        Self {
            settings,
            exchanger,
        }
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// Run the full login and return the issued tokens
    pub async fn login(&self, presenter: &dyn UrlPresenter) -> Result<TokenBundle, LoginError> {
        self.login_with_cancel(presenter, &CancellationToken::new())
            .await
    }

    /// Like [`login`](Self::login), aborting with `FlowError::Cancelled`
    /// when `cancel` fires while waiting for the browser
    pub async fn login_with_cancel(
        &self,
        presenter: &dyn UrlPresenter,
        cancel: &CancellationToken,
    ) -> Result<TokenBundle, LoginError> {
        let pkce = PkceChallenge::generate()?;
        debug!("Generated PKCE challenge");

        let listener = CallbackListener::bind(&self.settings.listener)?;
        let redirect_uri = listener.redirect_uri();

        let auth_url = build_authorization_url(
            &self.settings.authorization_endpoint,
            &self.settings.client_id,
            &redirect_uri,
            pkce.challenge(),
        );

        let handle = listener.spawn(cancel);

        info!("Waiting for authorization callback on {}", redirect_uri);
        presenter.present(&auth_url);

        let code = match handle.wait(self.settings.login_timeout).await {
            Ok(code) => code,
            Err(e) => {
                warn!("Login did not complete: {}", e);
                return Err(e.into());
            }
        };
        debug!("Authorization code received");

        let (verifier, _) = pkce.into_parts();
        let bundle = self
            .exchanger
            .exchange_code(
                &self.settings.token_endpoint,
                &self.settings.client_id,
                &code,
                &redirect_uri,
                &verifier,
            )
            .await?;

        info!("Login completed");
        Ok(bundle)
    }
}
