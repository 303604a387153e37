//! `lay`, `get` and `break`

use anyhow::{bail, Result};

use eggcarton_core::Config;

use super::session;

pub async fn lay(config: &Config, key: &str, value: &str) -> Result<()> {
    if key.trim().is_empty() {
        bail!("secret name must not be empty");
    }

    let session = session::open(config).await?;
    session.vault.put_secret(key, value).await?;
    eprintln!("Laid egg '{key}'");
    Ok(())
}

pub async fn get(config: &Config, key: Option<&str>) -> Result<()> {
    let session = session::open(config).await?;
    let secrets = session.vault.list_secrets(&session.owner).await?;

    match key {
        Some(key) => {
            let Some(secret) = secrets.iter().find(|s| s.secret_id == key) else {
                bail!("no egg named '{key}'");
            };
            println!("{}", secret.plaintext);
        }
        None if secrets.is_empty() => {
            eprintln!("Your carton is empty. Add a secret with 'egg lay <key> <value>'.")
        }
        None => {
            for secret in &secrets {
                println!("{}={}", secret.secret_id, secret.plaintext);
            }
        }
    }

    Ok(())
}

pub async fn break_egg(config: &Config, key: &str) -> Result<()> {
    let session = session::open(config).await?;
    session.vault.delete_secret(&session.owner, key).await?;
    eprintln!("Broke egg '{key}'");
    Ok(())
}
