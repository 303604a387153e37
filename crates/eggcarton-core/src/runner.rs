//! Run a command with secrets injected as environment variables

use std::collections::BTreeMap;
use std::process::Stdio;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::vault::Secret;

/// Environment variables for a set of secrets, keyed by upper-cased secret id
pub fn secret_env(secrets: &[Secret]) -> BTreeMap<String, String> {
    secrets
        .iter()
        .map(|s| (s.secret_id.to_uppercase(), s.plaintext.clone()))
        .collect()
}

/// Spawn `program` with inherited stdio and `env` merged into the current
/// environment, returning its exit code.
///
/// A child killed by a signal reports exit code 1.
pub async fn run_with_secrets(
    program: &str,
    args: &[String],
    env: &BTreeMap<String, String>,
) -> Result<i32> {
    info!("Running '{}' with {} secrets injected", program, env.len());
    debug!("Injected variables: {:?}", env.keys().collect::<Vec<_>>());

    let status = tokio::process::Command::new(program)
        .args(args)
        .envs(env)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("failed to run command '{program}'"))?;

    Ok(status.code().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(id: &str, value: &str) -> Secret {
        Secret {
            owner: "o".to_string(),
            secret_id: id.to_string(),
            plaintext: value.to_string(),
            created_at: None,
        }
    }

    #[test]
    fn test_secret_env_uppercases_ids() {
        let env = secret_env(&[secret("db_password", "p"), secret("ApiKey", "k")]);
        assert_eq!(env.get("DB_PASSWORD").map(String::as_str), Some("p"));
        assert_eq!(env.get("APIKEY").map(String::as_str), Some("k"));
        assert_eq!(env.len(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_code_passthrough() {
        let code = run_with_secrets(
            "sh",
            &["-c".to_string(), "exit 7".to_string()],
            &BTreeMap::new(),
        )
        .await
        .unwrap();
        assert_eq!(code, 7);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_is_injected() {
        let env = secret_env(&[secret("egg_test_value", "sunny")]);
        let code = run_with_secrets(
            "sh",
            &[
                "-c".to_string(),
                r#"test "$EGG_TEST_VALUE" = sunny"#.to_string(),
            ],
            &env,
        )
        .await
        .unwrap();
        assert_eq!(code, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_maps_to_one() {
        let code = run_with_secrets(
            "sh",
            &["-c".to_string(), "kill -9 $$".to_string()],
            &BTreeMap::new(),
        )
        .await
        .unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let result =
            run_with_secrets("definitely-not-a-real-program-egg", &[], &BTreeMap::new()).await;
        assert!(result.is_err());
    }
}
