//! Cancellation support for an interactive login
//!
//! Lets Ctrl-C (or any other caller) abort a login that is waiting on the
//! browser.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Wrapper around CancellationToken for login cancellation
#[derive(Clone)]
pub struct LoginCancellation {
    token: CancellationToken,
}

impl LoginCancellation {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Abort the login waiting on this token
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token to hand to `LoginFlow::login_with_cancel`
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel when the process receives Ctrl-C.
    ///
    /// The returned task should be aborted once the login finishes.
    pub fn cancel_on_ctrl_c(&self) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        debug!("Ctrl-C received, cancelling login");
                        token.cancel();
                    }
                    Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
                },
                _ = token.cancelled() => {}
            }
        })
    }
}

impl Default for LoginCancellation {
    fn default() -> Self {
        Self::new()
    }
}
