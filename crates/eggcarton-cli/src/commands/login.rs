//! `login`: interactive browser authentication

use anyhow::{bail, Result};
use tracing::{debug, warn};

use eggcarton_core::auth::{LoginCancellation, LoginFlow, UrlPresenter};
use eggcarton_core::{Config, CredentialStore};

/// Opens the system browser and prints the URL as a fallback
struct BrowserPresenter;

impl UrlPresenter for BrowserPresenter {
    fn present(&self, url: &str) {
        eprintln!("Opening browser for authentication...");
        eprintln!("If the browser doesn't open, visit this URL:\n\n  {url}\n");

        if let Err(e) = webbrowser::open(url) {
            warn!("Failed to open browser: {}", e);
        }
    }
}

pub async fn run(config: &Config, force: bool) -> Result<()> {
    let store = CredentialStore::new(config.credentials_path());

    if !force {
        match store.load().await {
            Ok(Some(bundle)) if bundle.is_valid() => {
                eprintln!("Already logged in. Use 'egg login --force' to re-authenticate.");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => warn!("Ignoring unreadable credentials: {:#}", anyhow::Error::from(e)),
        }
    }

    let flow = LoginFlow::new(config.oauth_settings()?)?;
    let cancellation = LoginCancellation::new();
    let ctrl_c = cancellation.cancel_on_ctrl_c();

    eprintln!("Waiting for authentication (press Ctrl-C to cancel)...");
    let result = flow
        .login_with_cancel(&BrowserPresenter, cancellation.token())
        .await;
    ctrl_c.abort();

    let bundle = match result {
        Ok(bundle) => bundle,
        Err(e) => {
            debug!("Login failed: {:?}", e);
            bail!(e.user_message());
        }
    };

    store.save(&bundle).await?;

    match bundle.owner() {
        Ok(owner) => eprintln!("Successfully logged in as {owner}."),
        Err(_) => eprintln!("Successfully logged in."),
    }
    Ok(())
}
