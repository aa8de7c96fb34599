//! Client configuration
//!
//! The backend base URL follows the build: debug builds talk to the local
//! backend, release builds to production. Everything can be overridden from
//! the environment (or a `.env` file).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{StoreError, StoreResult};

pub const PRODUCTION_API_URL: &str = "https://websitebackend-ekfo.onrender.com/api";
pub const LOCAL_API_URL: &str = "http://localhost:5000/api";

/// Which backend this build targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Local,
}

impl Environment {
    /// Build-time default
    pub fn current() -> Self {
        if cfg!(debug_assertions) {
            Self::Local
        } else {
            Self::Production
        }
    }

    pub fn default_api_url(&self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_API_URL,
            Self::Local => LOCAL_API_URL,
        }
    }
}

/// Where the session (principal + token) is kept between reloads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Lives as long as this client instance (one tab)
    #[default]
    Memory,
    /// JSON file under the user's config directory
    File,
    /// OS keychain
    Keyring,
    /// Nothing is kept
    None,
}

impl StorageMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "session" => Some(Self::Memory),
            "file" => Some(Self::File),
            "keyring" | "keychain" => Some(Self::Keyring),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub environment: Environment,

    /// Backend base URL, e.g. `http://localhost:5000/api`
    pub api_base_url: String,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// Hosted identity provider base URL, if one is used
    pub identity_url: Option<String>,

    /// Public (anon) key sent to the identity provider
    pub identity_anon_key: Option<String>,

    pub storage: StorageMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let environment = Environment::current();
        Self {
            environment,
            api_base_url: environment.default_api_url().to_string(),
            request_timeout_secs: 30,
            identity_url: None,
            identity_anon_key: None,
            storage: StorageMode::Memory,
        }
    }
}

impl ClientConfig {
    /// Config pointed at an explicit backend (tests, embedding apps)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load `.env` (current dir, then parent) and apply `LICENSEHUB_*` overrides
    pub fn from_env() -> StoreResult<Self> {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_path("../.env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but reading from an arbitrary source
    pub fn from_lookup<F>(lookup: F) -> StoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(env) = lookup("LICENSEHUB_ENV") {
            config.environment = match env.trim().to_ascii_lowercase().as_str() {
                "production" | "prod" => Environment::Production,
                "local" | "development" | "dev" => Environment::Local,
                other => {
                    return Err(StoreError::Config(format!("unknown environment '{}'", other)))
                }
            };
            config.api_base_url = config.environment.default_api_url().to_string();
        }

        if let Some(url) = lookup("LICENSEHUB_API_URL").filter(|u| !u.trim().is_empty()) {
            config.api_base_url = url.trim().to_string();
        }

        if let Some(timeout) = lookup("LICENSEHUB_TIMEOUT_SECS") {
            config.request_timeout_secs = timeout
                .trim()
                .parse()
                .map_err(|_| StoreError::Config(format!("invalid timeout '{}'", timeout)))?;
        }

        config.identity_url = lookup("LICENSEHUB_IDENTITY_URL").filter(|u| !u.trim().is_empty());
        config.identity_anon_key =
            lookup("LICENSEHUB_IDENTITY_KEY").filter(|k| !k.trim().is_empty());

        if let Some(mode) = lookup("LICENSEHUB_SESSION_STORAGE") {
            config.storage = StorageMode::parse(&mode)
                .ok_or_else(|| StoreError::Config(format!("unknown storage mode '{}'", mode)))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(StoreError::Config(format!(
                "api base url must be http(s): '{}'",
                self.api_base_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(StoreError::Config("timeout must be positive".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Join a path onto the base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
