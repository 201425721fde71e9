use papermerge_core::{PapermergeClient, PapermergeError, sanitize_host};
use thiserror::Error;

use crate::retry::RetryPolicy;

pub const HOST_ENV: &str = "PAPERMERGE_CLI__HOST";
pub const TOKEN_ENV: &str = "PAPERMERGE_CLI__TOKEN";

/// Source of configuration values, normally the process environment.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("REST API host is not set; export {env} or pass --host", env = HOST_ENV)]
    MissingHost,
    #[error("authorization token is not set; export {env} or pass --token", env = TOKEN_ENV)]
    MissingToken,
    #[error("invalid host: {0}")]
    Client(#[from] PapermergeError),
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub host: String,
    pub token: String,
    pub retry: RetryPolicy,
}

impl CliConfig {
    /// Builds the configuration from already parsed flag values (clap fills
    /// them from the environment) plus retry overrides from `lookup`.
    pub fn resolve(
        host: Option<String>,
        token: Option<String>,
        lookup: EnvLookup<'_>,
    ) -> Result<Self, ConfigError> {
        let host = host
            .map(|value| sanitize_host(&value))
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingHost)?;
        let token = token
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingToken)?;
        Ok(Self {
            host,
            token,
            retry: RetryPolicy::from_env(lookup),
        })
    }

    pub fn client(&self) -> Result<PapermergeClient, ConfigError> {
        Ok(PapermergeClient::new(&self.host, self.token.clone())?)
    }
}

pub(crate) fn read_u64(lookup: EnvLookup<'_>, name: &str, default: u64) -> u64 {
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

pub(crate) fn read_bool(lookup: EnvLookup<'_>, name: &str, default: bool) -> bool {
    lookup(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}
