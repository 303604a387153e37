//! Core library for EggCarton
//!
//! - OAuth PKCE login against the Cognito hosted UI
//! - Local credential storage with silent token refresh
//! - Client for the secret vault API and the `hatch` subprocess runner

pub mod auth;
pub mod config;
pub mod credentials;
pub mod runner;
pub mod vault;

pub use config::Config;
pub use credentials::CredentialStore;
