//! `hatch`: run a command with secrets in its environment

use anyhow::{Context, Result};
use tracing::info;

use eggcarton_core::runner::{run_with_secrets, secret_env};
use eggcarton_core::Config;

use super::session;

/// Returns the child's exit code
pub async fn run(config: &Config, command: &[String]) -> Result<i32> {
    let (program, args) = command.split_first().context("no command given")?;

    let session = session::open(config).await?;
    let secrets = session.vault.list_secrets(&session.owner).await?;
    let env = secret_env(&secrets);
    info!("Hatching {} eggs into the environment", env.len());

    run_with_secrets(program, args, &env).await
}
