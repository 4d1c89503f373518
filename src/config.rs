//! Client configuration.
//!
//! A configuration can be built directly, read from the `SW_*` environment
//! variables, or loaded from a TOML file. The configured `host` carries both
//! the server origin and the dashboard root, e.g.
//! `https://a.statwolf.endpoint/dashboard/path`.

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{StatwolfError, StatwolfResult};

pub const ENV_HOST: &str = "SW_HOST";
pub const ENV_USERNAME: &str = "SW_USERNAME";
pub const ENV_PASSWORD: &str = "SW_PASSWORD";
pub const ENV_TIMEOUT: &str = "SW_TIMEOUT_SECS";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Connection settings for a Statwolf dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Full dashboard url, origin plus root path
    pub host: String,
    /// Account name sent in the auth header
    pub username: String,
    /// Account password sent in the auth header
    pub password: String,
    /// Request timeout applied by the HTTP transport
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Origin and dashboard root derived from the configured host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Scheme and authority, e.g. `https://a.statwolf.endpoint`
    pub origin: String,
    /// Path prefix of the dashboard, e.g. `/dashboard/path`
    pub root: String,
}

impl Endpoint {
    /// Prefixes `url` with the dashboard root
    pub fn to_dashboard(&self, url: &str) -> String {
        if self.root == "/" {
            url.to_string()
        } else {
            format!("{}{}", self.root, url)
        }
    }
}

impl ClientConfig {
    pub fn new(host: &str, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Reads the configuration from `SW_HOST`, `SW_USERNAME` and `SW_PASSWORD`
    pub fn from_env() -> StatwolfResult<Self> {
        let read = |key: &str| {
            std::env::var(key)
                .map_err(|_| StatwolfError::InvalidConfig(format!("{} environment variable not set", key)))
        };

        let mut config = Self::new(&read(ENV_HOST)?, &read(ENV_USERNAME)?, &read(ENV_PASSWORD)?);
        if let Ok(timeout) = std::env::var(ENV_TIMEOUT) {
            config.timeout_secs = timeout.parse().map_err(|_| {
                StatwolfError::InvalidConfig(format!("{} must be a number of seconds", ENV_TIMEOUT))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> StatwolfResult<Self> {
        let path = path.as_ref();
        debug!("Loading client configuration from {}", path.display());

        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Location of the per-user configuration file, if a config dir exists
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("statwolf").join("config.toml"))
    }

    /// Checks that host, username and password are all present
    pub fn validate(&self) -> StatwolfResult<()> {
        let missing: Vec<&str> = [
            ("host", &self.host),
            ("username", &self.username),
            ("password", &self.password),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(StatwolfError::InvalidConfig(format!("missing {}", missing.join(", "))))
        }
    }

    /// Splits the host into origin (first three `/` segments) and root path
    pub fn endpoint(&self) -> Endpoint {
        let tokens: Vec<&str> = self.host.split('/').collect();
        let split = tokens.len().min(3);

        Endpoint {
            origin: tokens[..split].join("/"),
            root: format!("/{}", tokens[split..].join("/")),
        }
    }

    /// Value of the `statwolf-auth` header
    pub fn auth_header(&self) -> String {
        format!("{}:{}", self.username, self.password)
    }
}
