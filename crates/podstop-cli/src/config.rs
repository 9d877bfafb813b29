//! Tunables loaded from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use podstop_core::Intervals;
use podstop_wls::{HttpSettings, NodeManagerSettings};
use serde::Deserialize;

/// Global configuration for podstop
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub intervals: IntervalsConfig,
    pub paths: PathsConfig,
    pub node_manager: NodeManagerConfig,
    pub http: HttpConfig,
}

/// Poll and retry delays, in seconds
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct IntervalsConfig {
    pub unavailable_secs: u64,
    pub endangered_secs: u64,
    pub query_error_secs: u64,
    pub reconnect_secs: u64,
}

impl Default for IntervalsConfig {
    fn default() -> Self {
        let d = Intervals::default();
        Self {
            unavailable_secs: d.unavailable.as_secs(),
            endangered_secs: d.endangered.as_secs(),
            query_error_secs: d.query_error.as_secs(),
            reconnect_secs: d.reconnect.as_secs(),
        }
    }
}

impl IntervalsConfig {
    pub fn intervals(&self) -> Intervals {
        Intervals {
            unavailable: Duration::from_secs(self.unavailable_secs),
            endangered: Duration::from_secs(self.endangered_secs),
            query_error: Duration::from_secs(self.query_error_secs),
            reconnect: Duration::from_secs(self.reconnect_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Base64 secret published by the introspector
    #[serde(deserialize_with = "deserialize_env_path")]
    pub secret_file: PathBuf,
    /// Scratch location of the decoded key
    #[serde(deserialize_with = "deserialize_env_path")]
    pub key_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            secret_file: PathBuf::from("/weblogic-operator/introspector/userKeyNodeManager.secure"),
            key_file: PathBuf::from("/tmp/userKeyNodeManager.secure.bin"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeManagerConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for NodeManagerConfig {
    fn default() -> Self {
        let d = NodeManagerSettings::default();
        Self {
            host: d.host,
            port: d.port,
            connect_timeout_secs: d.connect_timeout.as_secs(),
            read_timeout_secs: d.read_timeout.as_secs(),
        }
    }
}

impl NodeManagerConfig {
    pub fn settings(&self) -> NodeManagerSettings {
        NodeManagerSettings {
            host: self.host.clone(),
            port: self.port,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub insecure_tls: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let d = HttpSettings::default();
        Self {
            connect_timeout_secs: d.connect_timeout.as_secs(),
            request_timeout_secs: d.request_timeout.as_secs(),
            insecure_tls: d.insecure_tls,
        }
    }
}

impl HttpConfig {
    pub fn settings(&self) -> HttpSettings {
        HttpSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            insecure_tls: self.insecure_tls,
        }
    }
}

/// Deserialize a path that may be an environment variable reference like ${VAR}
fn deserialize_env_path<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    expand_env_var(&raw).map(PathBuf::from).ok_or_else(|| {
        serde::de::Error::custom(format!("environment variable in {raw} is not set"))
    })
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./podstop.toml (current directory)
    /// 2. ~/.config/podstop/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("podstop.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "podstop") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
