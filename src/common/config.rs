//! Configuration file handling
//!
//! Every section is optional; missing values fall back to defaults and
//! command line flags override whatever the file says.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Server under test
    #[serde(default)]
    pub server: ServerConfig,

    /// Connection pool settings
    #[serde(default)]
    pub pool: PoolConfig,

    /// Console output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Server under test
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket resource path
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    51233
}
fn default_path() -> String {
    "/".to_string()
}

/// Connection pool settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PoolConfig {
    /// Number of persistent sessions
    #[serde(default = "default_pool_size")]
    pub size: usize,

    /// Timeout for resolve, connect and handshake
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl PoolConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_pool_size() -> usize {
    4
}
fn default_connect_timeout() -> u64 {
    10
}

/// Console output settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    /// 0 silent, 1 progress and verdicts, 2 payloads as well
    #[serde(default = "default_verbosity")]
    pub verbosity: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            verbosity: default_verbosity(),
        }
    }
}

fn default_verbosity() -> u8 {
    1
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigParse(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pool.size == 0 {
            return Err(Error::Config("pool.size must be at least 1".to_string()));
        }
        if self.pool.connect_timeout_secs == 0 {
            return Err(Error::Config(
                "pool.connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
