//! Configuration management for the transfer engine.
//!
//! Loads configuration from a TOML file with environment variable overrides
//! (`COLDVAULT_<SECTION>__<KEY>`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::backup::BackendKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend holding the archives
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub glacier: Option<GlacierConfig>,

    #[serde(default)]
    pub gcs: Option<GcsConfig>,

    #[serde(default)]
    pub log: LogConfig,
}

/// Tunables shared by every operation of a backend. Set once when the
/// backend is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Archives up to this size (bytes) are sent in a single request
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,

    /// Size of every multipart part except the last (bytes)
    #[serde(default = "default_part_size")]
    pub part_size: usize,

    /// Delay between two job status checks (seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlacierConfig {
    /// Account owning the vault ("-" selects the credentials' account)
    #[serde(default = "default_account_id")]
    pub account_id: String,

    pub vault_name: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GcsConfig {
    pub bucket: String,

    /// Base URL of the Cloud Storage JSON API
    #[serde(default = "default_gcs_endpoint")]
    pub endpoint: String,

    /// OAuth2 bearer token
    #[serde(default)]
    pub auth_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("part size must be greater than zero")]
    InvalidPartSize,

    #[error("poll interval must be greater than zero")]
    InvalidPollInterval,

    #[error("backend \"{0}\" selected but its section is missing")]
    MissingSection(BackendKind),
}

// Default values
fn default_backend() -> BackendKind {
    BackendKind::Glacier
}

fn default_multipart_threshold() -> u64 {
    100 * 1024 * 1024 // 100 MiB
}

fn default_part_size() -> usize {
    4 * 1024 * 1024 // 4 MiB
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_account_id() -> String {
    "-".to_string()
}

fn default_gcs_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            multipart_threshold: default_multipart_threshold(),
            part_size: default_part_size(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl TransferConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.part_size == 0 {
            return Err(ConfigError::InvalidPartSize);
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }
        Ok(())
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl fmt::Debug for GcsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcsConfig")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: default_backend(),
            transfer: TransferConfig::default(),
            glacier: None,
            gcs: None,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).format(::config::FileFormat::Toml))
            .add_source(
                ::config::Environment::with_prefix("COLDVAULT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transfer.validate()?;
        match self.backend {
            BackendKind::Glacier if self.glacier.is_none() => {
                Err(ConfigError::MissingSection(BackendKind::Glacier))
            }
            BackendKind::Gcs if self.gcs.is_none() => Err(ConfigError::MissingSection(BackendKind::Gcs)),
            _ => Ok(()),
        }
    }
}
