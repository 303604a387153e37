//! Authenticated access to the secret API

use anyhow::{Context, Result};

use eggcarton_core::auth::{TokenExchanger, TokenManager};
use eggcarton_core::vault::VaultClient;
use eggcarton_core::{Config, CredentialStore};

/// A vault client bound to the logged-in user
pub struct Session {
    pub vault: VaultClient,
    pub owner: String,
}

/// Load (and if needed refresh) the stored session
pub async fn open(config: &Config) -> Result<Session> {
    let settings = config.oauth_settings()?;
    let manager = TokenManager::new(
        CredentialStore::new(config.credentials_path()),
        TokenExchanger::new(settings.http_timeout)?,
        settings.token_endpoint,
        settings.client_id,
    );

    let bundle = manager.valid_bundle().await?;
    let owner = bundle
        .owner()
        .context("stored access token has no usable identity, run 'egg login' again")?;
    let vault = VaultClient::new(&config.api_endpoint, bundle.access_token)?;

    Ok(Session { vault, owner })
}
