//! Authentication for EggCarton
//!
//! - OAuth PKCE flow with a local callback listener
//! - Token lifecycle policy and silent refresh
//! - Owner identity derived from the access token

pub mod authorize;
pub mod callback;
mod cancellation;
mod claims;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod lifecycle;
pub mod pkce;
pub mod providers;
pub mod token_manager;
pub mod types;

pub use authorize::{build_authorization_url, AuthorizationRequest};
pub use callback::{
    AuthorizationCode, CallbackListener, CallbackResult, ListenerConfig, ListenerHandle,
    ListenerState,
};
pub use cancellation::LoginCancellation;
pub use claims::owner_from_access_token;
pub use error::{ClaimsError, EntropyError, ExchangeError, FlowError, LoginError, SessionError};
pub use exchange::TokenExchanger;
pub use flow::{LoginFlow, UrlPresenter};
pub use pkce::PkceChallenge;
pub use token_manager::TokenManager;
pub use types::{OAuthSettings, TokenBundle};
