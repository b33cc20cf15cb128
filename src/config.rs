//! Configuration file handling.
//!
//! This module handles loading, merging and validating configuration
//! from `.crossvote.toml` files. The resulting [`Config`] is built once
//! at startup and never changes afterwards.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = ".crossvote.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Vote sources to aggregate, in report order.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            sources: default_sources(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Id of this deployment, reported by `/api/results`.
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Per-source timeout used when a source does not set its own.
    #[serde(default = "default_timeout")]
    pub default_timeout_seconds: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            default_timeout_seconds: default_timeout(),
        }
    }
}

fn default_instance() -> String {
    "local".to_string()
}

fn default_timeout() -> u64 {
    5
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind in `--serve` mode.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5001".to_string()
}

/// Backing implementation of a vote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Process-local counters.
    Memory,
    /// Local SQLite database.
    Sqlite,
    /// Peer deployment reached over HTTP.
    Remote,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Memory => write!(f, "memory"),
            SourceKind::Sqlite => write!(f, "sqlite"),
            SourceKind::Remote => write!(f, "remote"),
        }
    }
}

/// Connection descriptor for one vote source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,

    pub kind: SourceKind,

    /// Database file for `sqlite` sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Base URL of the peer for `remote` sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Overrides `general.default_timeout_seconds`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Whether votes cast on this deployment are recorded here.
    #[serde(default)]
    pub writable: bool,

    /// Environment variable holding a bearer token for the peer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

impl SourceConfig {
    pub fn memory(id: &str, writable: bool) -> Self {
        Self {
            id: id.to_string(),
            kind: SourceKind::Memory,
            path: None,
            url: None,
            timeout_seconds: None,
            writable,
            token_env: None,
        }
    }
}

fn default_sources() -> Vec<SourceConfig> {
    vec![SourceConfig::memory(&default_instance(), true)]
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>, ConfigError> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only explicitly provided values override.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref bind) = args.bind {
            self.server.bind = bind.clone();
        }

        if let Some(ref instance) = args.instance {
            self.general.instance = instance.clone();
        }

        if let Some(timeout) = args.timeout {
            self.general.default_timeout_seconds = timeout;
            for source in &mut self.sources {
                source.timeout_seconds = None;
            }
        }
    }

    /// Check the configuration for problems that would make aggregation meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        if self.general.instance.trim().is_empty() {
            return Err(ConfigError::InvalidSetting(
                "general.instance must not be empty".to_string(),
            ));
        }

        if self.general.default_timeout_seconds == 0 {
            return Err(ConfigError::InvalidSetting(
                "general.default_timeout_seconds must be at least 1".to_string(),
            ));
        }

        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidSetting(format!(
                "server.bind is not a socket address: {}",
                self.server.bind
            )));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            validate_source(source)?;
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::DuplicateSource(source.id.clone()));
            }
        }

        let writable: Vec<String> = self
            .sources
            .iter()
            .filter(|s| s.writable)
            .map(|s| s.id.clone())
            .collect();
        if writable.len() > 1 {
            return Err(ConfigError::MultipleWritable(writable));
        }

        Ok(())
    }

    /// Effective timeout for a source.
    pub fn timeout_for(&self, source: &SourceConfig) -> Duration {
        Duration::from_secs(
            source
                .timeout_seconds
                .unwrap_or(self.general.default_timeout_seconds),
        )
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let mut config = Config::default();
        config.sources.push(SourceConfig {
            id: "peer".to_string(),
            kind: SourceKind::Remote,
            path: None,
            url: Some("http://localhost:5000".to_string()),
            timeout_seconds: Some(default_timeout()),
            writable: false,
            token_env: None,
        });

        let body = toml::to_string_pretty(&config).unwrap_or_else(|_| String::new());
        format!(
            "# crossvote configuration\n\
             # Source kinds: memory, sqlite (needs `path`), remote (needs `url`).\n\
             # At most one source may be writable.\n\n{}",
            body
        )
    }
}

fn validate_source(source: &SourceConfig) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidSource {
        id: source.id.clone(),
        reason: reason.to_string(),
    };

    if source.id.trim().is_empty() {
        return Err(invalid("id must not be empty"));
    }

    if source.timeout_seconds == Some(0) {
        return Err(invalid("timeout_seconds must be at least 1"));
    }

    match source.kind {
        SourceKind::Memory => {}
        SourceKind::Sqlite => {
            if source.path.is_none() {
                return Err(invalid("sqlite sources need a `path`"));
            }
        }
        SourceKind::Remote => {
            let url = source
                .url
                .as_deref()
                .ok_or_else(|| invalid("remote sources need a `url`"))?;
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(invalid("url must start with 'http://' or 'https://'"));
            }
            if source.writable {
                return Err(invalid("remote sources are read-only"));
            }
        }
    }

    Ok(())
}
