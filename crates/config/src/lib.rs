#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for seclabel
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/seclabel/config.toml)
//! - Environment variables
//! - CLI flags

pub mod constants;

pub use constants as fixed_paths;

use serde::{Deserialize, Serialize};
use seclabel_errors::{ConfigError, Error};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub policy: PolicyConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Render results as JSON instead of plain text
    #[serde(default)]
    pub json: bool,
}

/// Async dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Blocking worker threads handed to the runtime (0 = auto-detect)
    #[serde(default)]
    pub worker_threads: usize,
    /// Paths longer than this are rejected before submission
    #[serde(default = "default_max_path_len")]
    pub max_path_len: usize,
}

/// Where to find the labeling subsystem and its policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_selinux_root")]
    pub selinux_root: PathBuf,
    /// Overrides `SELINUXTYPE=` from `<selinux_root>/config`
    #[serde(default)]
    pub policy_type: Option<String>,
    #[serde(default = "default_procfs_root")]
    pub procfs_root: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            json: false,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            max_path_len: default_max_path_len(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            selinux_root: default_selinux_root(),
            policy_type: None,
            procfs_root: default_procfs_root(),
        }
    }
}

// Default value functions for serde
fn default_log_filter() -> String {
    "warn,seclabel=info".to_string()
}

fn default_max_path_len() -> usize {
    constants::PATH_MAX
}

fn default_selinux_root() -> PathBuf {
    PathBuf::from(constants::SELINUX_ROOT)
}

fn default_procfs_root() -> PathBuf {
    PathBuf::from(constants::PROCFS_ROOT)
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("seclabel").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, contains invalid TOML,
    /// or holds values that fail validation.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: &Option<PathBuf>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // SECLABEL_WORKER_THREADS
        if let Ok(threads) = std::env::var("SECLABEL_WORKER_THREADS") {
            self.dispatch.worker_threads =
                threads.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "SECLABEL_WORKER_THREADS".to_string(),
                    value: threads,
                })?;
        }

        // SECLABEL_MAX_PATH_LEN
        if let Ok(len) = std::env::var("SECLABEL_MAX_PATH_LEN") {
            self.dispatch.max_path_len = len.parse().map_err(|_| ConfigError::InvalidValue {
                field: "SECLABEL_MAX_PATH_LEN".to_string(),
                value: len,
            })?;
        }

        // SECLABEL_POLICY_TYPE
        if let Ok(policy_type) = std::env::var("SECLABEL_POLICY_TYPE") {
            if policy_type.is_empty() || policy_type.contains('/') {
                return Err(ConfigError::InvalidValue {
                    field: "SECLABEL_POLICY_TYPE".to_string(),
                    value: policy_type,
                }
                .into());
            }
            self.policy.policy_type = Some(policy_type);
        }

        // SECLABEL_SELINUX_ROOT
        if let Ok(root) = std::env::var("SECLABEL_SELINUX_ROOT") {
            self.policy.selinux_root = PathBuf::from(root);
        }

        self.validate()
    }

    /// Check invariants serde cannot express
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.dispatch.max_path_len == 0 || self.dispatch.max_path_len > constants::PATH_MAX {
            return Err(ConfigError::InvalidValue {
                field: "dispatch.max_path_len".to_string(),
                value: self.dispatch.max_path_len.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Directory for debug log files
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::cache_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join("seclabel")
            .join("logs")
    }
}

/// Calculate blocking worker threads based on CPU count
#[must_use]
pub fn calculate_worker_threads(config_value: usize) -> usize {
    if config_value > 0 {
        config_value // User override
    } else {
        // Label lookups are short syscalls; a few threads per core is plenty
        (num_cpus::get() * 2).clamp(2, 64)
    }
}
