//! Identity provider configurations

pub mod cognito;

pub use cognito::{cognito_settings, CognitoDomain};
