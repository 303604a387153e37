//! Subcommand implementations

pub mod hatch;
pub mod login;
pub mod logout;
pub mod secrets;
mod session;
