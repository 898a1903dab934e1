//! Server configuration read from the environment.
//!
//! - `SHOPGLOW_HOST` - bind address (default: 0.0.0.0)
//! - `SHOPGLOW_PORT` - listen port (default: 3000)
//! - `SHOPGLOW_STORE` - `memory` or `sqlite` (default: memory)
//! - `SHOPGLOW_DATABASE_PATH` - sqlite file (default: `$HOME/.shopglow/shopglow.db`)
//! - `OPENAI_API_KEY` - completion service key; chat runs offline without it
//! - `OPENAI_BASE_URL` - default `https://api.openai.com/v1`
//! - `OPENAI_MODEL` - default `gpt-4o`
//! - `OPENAI_MAX_TOKENS` - default 1000
//! - `OPENAI_TEMPERATURE` - default 0.7

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Sqlite,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "sqlite" => Ok(StoreKind::Sqlite),
            other => Err(format!("expected `memory` or `sqlite`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub store: StoreKind,
    pub database_path: PathBuf,
    pub assistant: AssistantConfig,
}

/// Settings for the hosted completion service.
///
/// `Debug` is written by hand so the key never reaches the logs.
#[derive(Clone)]
pub struct AssistantConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl std::fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source. Blank
    /// values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let defaults = AssistantConfig::default();
        let assistant = AssistantConfig {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            model: get("OPENAI_MODEL").unwrap_or(defaults.model),
            max_tokens: parse_or(&get, "OPENAI_MAX_TOKENS", defaults.max_tokens)?,
            temperature: parse_or(&get, "OPENAI_TEMPERATURE", defaults.temperature)?,
        };

        let database_path = match get("SHOPGLOW_DATABASE_PATH") {
            Some(path) => PathBuf::from(path),
            None => {
                let home = get("HOME").unwrap_or_else(|| ".".into());
                PathBuf::from(home).join(".shopglow").join("shopglow.db")
            }
        };

        Ok(Self {
            host: parse_or(&get, "SHOPGLOW_HOST", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or(&get, "SHOPGLOW_PORT", 3000)?,
            store: parse_or(&get, "SHOPGLOW_STORE", StoreKind::Memory)?,
            database_path,
            assistant,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
