//! # Client configuration
//!
//! Read from a YAML file, with environment variables layered on top:
//!
//! ```yaml
//! api_url: "http://localhost:8000"
//! credential_file: "/home/me/.local/share/finance-tracker/token"
//! log_level: "info"
//! ```
//!
//! Every field is optional. A missing file means all defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ClientError, Result};
use crate::services::api::DEFAULT_API_URL;

pub const API_URL_ENV: &str = "FINANCE_TRACKER_API_URL";
pub const LOG_LEVEL_ENV: &str = "FINANCE_TRACKER_LOG_LEVEL";

const CONFIG_FILE_NAME: &str = "config.yaml";
const CREDENTIAL_FILE_NAME: &str = "token";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the finance tracker service
    pub api_url: String,
    /// Where the bearer token is persisted; defaults to the platform data dir
    pub credential_file: Option<PathBuf>,
    /// Default tracing filter when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            credential_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Ok(Self::default()),
            Ok(content) => Self::from_yaml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ClientError::Config(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Apply `FINANCE_TRACKER_*` environment variables
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_url = url;
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.log_level = level;
        }
        self
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl ClientConfig {
    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("", "", "finance-tracker")
    }

    /// `config.yaml` in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load the default config file, then apply environment overrides
    pub fn load_default() -> Result<Self> {
        let config = match Self::default_path() {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    /// Resolved location of the persisted credential
    pub fn credential_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.credential_file {
            return Ok(path.clone());
        }
        Self::project_dirs()
            .map(|dirs| dirs.data_dir().join(CREDENTIAL_FILE_NAME))
            .ok_or_else(|| {
                ClientError::Config("no home directory to store the credential in".to_string())
            })
    }
}
