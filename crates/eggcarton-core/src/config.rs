//! Configuration loading
//!
//! Values are layered, later sources overriding earlier ones:
//! 1. Defaults compiled into the binary (`EGG_*` at build time)
//! 2. `~/.eggcarton/config.toml`
//! 3. Environment variables, after loading `.env` from the working directory
//!
//! ## Environment Variables
//! - `API_ENDPOINT`: base URL of the secret API
//! - `COGNITO_USER_POOL_ID`, `COGNITO_REGION`: user pool identification
//! - `COGNITO_CLIENT_ID`: app client ID (public, no secret)
//! - `COGNITO_DOMAIN`: hosted UI domain
//! - `EGG_CALLBACK_PORT`: local callback port (default 8080)
//! - `EGG_LOGIN_TIMEOUT_SECS`: how long to wait for the browser (default 300)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::auth::callback::{ListenerConfig, DEFAULT_CALLBACK_PORT};
use crate::auth::providers::{cognito_settings, CognitoDomain};
use crate::auth::types::{OAuthSettings, DEFAULT_LOGIN_TIMEOUT};

const DATA_DIR_NAME: &str = ".eggcarton";
const CONFIG_FILE: &str = "config.toml";
pub const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("could not determine home directory")]
    NoHomeDir,

    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("invalid Cognito domain")]
    Domain(#[from] url::ParseError),
}

/// Cognito user pool settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CognitoConfig {
    pub user_pool_id: String,
    pub client_id: String,
    pub domain: String,
    pub region: String,
}

/// Resolved CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_endpoint: String,
    pub cognito: CognitoConfig,
    pub callback_port: u16,
    pub login_timeout: Duration,
    data_dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    api_endpoint: Option<String>,
    #[serde(default)]
    cognito: FileCognito,
    #[serde(default)]
    login: FileLogin,
}

#[derive(Debug, Default, Deserialize)]
struct FileCognito {
    user_pool_id: Option<String>,
    client_id: Option<String>,
    domain: Option<String>,
    region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileLogin {
    callback_port: Option<u16>,
    timeout_secs: Option<u64>,
}

/// `~/.eggcarton`
pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(DATA_DIR_NAME))
        .ok_or(ConfigError::NoHomeDir)
}

impl Config {
    /// Load from all sources using the real home directory and environment
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {:?}", path),
            Err(e) if e.not_found() => {}
            Err(e) => debug!("Ignoring unreadable .env file: {}", e),
        }

        let data_dir = default_data_dir()?;
        Self::load_from(&data_dir, |name| std::env::var(name).ok())
    }

    /// Load with an explicit data directory and environment lookup
    pub fn load_from(
        data_dir: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = read_file_config(&data_dir.join(CONFIG_FILE))?;
        let env = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let pick = |env_name: &str, file_value: Option<String>, built_in: Option<&'static str>| {
            env(env_name)
                .or(file_value.filter(|v| !v.trim().is_empty()))
                .or(built_in.map(str::to_string))
                .unwrap_or_default()
        };

        let api_endpoint = pick(
            "API_ENDPOINT",
            file.api_endpoint,
            option_env!("EGG_API_ENDPOINT"),
        );
        let cognito = CognitoConfig {
            user_pool_id: pick(
                "COGNITO_USER_POOL_ID",
                file.cognito.user_pool_id,
                option_env!("EGG_COGNITO_USER_POOL_ID"),
            ),
            client_id: pick(
                "COGNITO_CLIENT_ID",
                file.cognito.client_id,
                option_env!("EGG_COGNITO_CLIENT_ID"),
            ),
            domain: pick(
                "COGNITO_DOMAIN",
                file.cognito.domain,
                option_env!("EGG_COGNITO_DOMAIN"),
            ),
            region: pick(
                "COGNITO_REGION",
                file.cognito.region,
                option_env!("EGG_COGNITO_REGION"),
            ),
        };

        let mut missing = Vec::new();
        if api_endpoint.is_empty() {
            missing.push("API_ENDPOINT");
        }
        if cognito.client_id.is_empty() {
            missing.push("COGNITO_CLIENT_ID");
        }
        if cognito.domain.is_empty() {
            missing.push("COGNITO_DOMAIN");
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let callback_port = match env("EGG_CALLBACK_PORT") {
            Some(value) => parse_env("EGG_CALLBACK_PORT", value)?,
            None => file.login.callback_port.unwrap_or(DEFAULT_CALLBACK_PORT),
        };
        let login_timeout = match env("EGG_LOGIN_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(parse_env("EGG_LOGIN_TIMEOUT_SECS", value)?),
            None => file
                .login
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_LOGIN_TIMEOUT),
        };

        Ok(Self {
            api_endpoint: api_endpoint.trim_end_matches('/').to_string(),
            cognito,
            callback_port,
            login_timeout,
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join(CREDENTIALS_FILE)
    }

    pub fn authorization_url(&self) -> String {
        CognitoDomain::new(&self.cognito.domain).authorization_url()
    }

    pub fn token_url(&self) -> String {
        CognitoDomain::new(&self.cognito.domain).token_url()
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig::with_port(self.callback_port)
    }

    pub fn redirect_uri(&self) -> String {
        self.listener_config().redirect_uri()
    }

    /// Settings for an interactive login against the configured user pool
    pub fn oauth_settings(&self) -> Result<OAuthSettings, ConfigError> {
        Ok(cognito_settings(&self.cognito.domain, &self.cognito.client_id)?
            .with_listener(self.listener_config())
            .with_login_timeout(self.login_timeout))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileConfig::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    debug!("Reading config file {:?}", path);
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}
