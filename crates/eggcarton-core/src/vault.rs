//! Secret API client
//!
//! Secrets ("eggs") are stored per owner. Every request carries the access
//! token as a bearer credential.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("eggcarton/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub owner: String,
    pub secret_id: String,
    pub plaintext: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Serialize)]
struct PutSecretRequest<'a> {
    secret_id: &'a str,
    plaintext: &'a str,
}

#[derive(Deserialize)]
struct ListSecretsResponse {
    #[serde(default)]
    eggs: Vec<Secret>,
}

pub struct VaultClient {
    client: reqwest::Client,
    base_url: Url,
    access_token: String,
}

impl VaultClient {
    pub fn new(base_url: &str, access_token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("building HTTP client")?;
        Self::with_client(client, base_url, access_token)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        access_token: impl Into<String>,
    ) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid API endpoint '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            bail!("invalid API endpoint '{}'", base_url);
        }
        Ok(Self {
            client,
            base_url,
            access_token: access_token.into(),
        })
    }

    /// Store a secret under the caller's identity
    pub async fn put_secret(&self, key: &str, value: &str) -> Result<()> {
        let url = self.endpoint(&["eggs"])?;
        debug!("Vault API: storing secret '{}'", key);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&PutSecretRequest {
                secret_id: key,
                plaintext: value,
            })
            .send()
            .await
            .context("storing secret")?;

        check_status(response, "storing secret").await?;
        Ok(())
    }

    /// All secrets belonging to `owner`
    pub async fn list_secrets(&self, owner: &str) -> Result<Vec<Secret>> {
        let url = self.endpoint(&["eggs", owner])?;
        debug!("Vault API: listing secrets");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("fetching secrets")?;

        let response = check_status(response, "fetching secrets").await?;
        let body: ListSecretsResponse = response.json().await.context("parsing secrets")?;
        debug!("Vault API: found {} secrets", body.eggs.len());
        Ok(body.eggs)
    }

    pub async fn delete_secret(&self, owner: &str, key: &str) -> Result<()> {
        let url = self.endpoint(&["eggs", owner, key])?;
        debug!("Vault API: deleting secret '{}'", key);

        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("deleting secret")?;

        check_status(response, "deleting secret").await?;
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("invalid API endpoint '{}'", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn check_status(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("API error while {} ({}): {}", action, status.as_u16(), body.trim());
}
