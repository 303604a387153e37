//! Credential file storage
//!
//! The token bundle lives in a single JSON file readable only by the owner.
//! Saves go through a sibling temp file and a rename, so readers see either
//! the old bundle or the new one.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::auth::TokenBundle;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to access credential file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credential file {path} is corrupted")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize credentials")]
    Serialize(#[source] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CredentialError + '_ {
    move |source| CredentialError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored bundle, `None` when nobody has logged in yet
    pub async fn load(&self) -> Result<Option<TokenBundle>, CredentialError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No credential file at {:?}", self.path);
                return Ok(None);
            }
            Err(e) => return Err(io_error(&self.path)(e)),
        };

        let bundle = serde_json::from_str(&content).map_err(|source| CredentialError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(bundle))
    }

    /// Replace the stored bundle
    pub async fn save(&self, bundle: &TokenBundle) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))
                    .await
                    .map_err(io_error(parent))?;
            }
        }

        let json = serde_json::to_string_pretty(bundle).map_err(CredentialError::Serialize)?;

        let tmp_path = self.tmp_path();
        let result = write_private(&tmp_path, json.as_bytes()).await;
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e);
        }

        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(io_error(&self.path))?;

        info!("Credentials saved to {:?}", self.path);
        Ok(())
    }

    /// Remove the credential file. Returns whether there was one.
    pub async fn delete(&self) -> Result<bool, CredentialError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Credentials removed from {:?}", self.path);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&self.path)(e)),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "credentials.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

async fn write_private(path: &Path, contents: &[u8]) -> Result<(), CredentialError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await.map_err(io_error(path))?;

    // Mode only applies on creation; tighten a leftover temp file too
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(io_error(path))?;
    }

    file.write_all(contents).await.map_err(io_error(path))?;
    file.sync_all().await.map_err(io_error(path))?;
    Ok(())
}
