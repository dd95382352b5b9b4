#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for sideload
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/sideload/config.toml)
//! - Environment variables (`SIDELOAD_*`)
//! - CLI flags
//!
//! Platform-dependent installer behaviour is resolved here once into
//! [`PlatformCapabilities`] and passed down, never re-derived at call sites.

pub mod constants;

use serde::{Deserialize, Serialize};
use sideload_errors::{ConfigError, Error};
use sideload_signing::TrustPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub use constants as fixed_paths;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub install: InstallConfig,

    #[serde(default)]
    pub platform: PlatformConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub default_output: OutputFormat,
}

/// Path configuration; unset entries fall back to per-user directories
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    pub staging_dir: Option<PathBuf>,
    pub service_root: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

/// Install flow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Seconds to wait for a completion signal after commit; 0 waits forever
    #[serde(default = "default_completion_timeout")]
    pub completion_timeout: u64,
    #[serde(default = "default_installer_label")]
    pub installer_label: String,
    #[serde(default = "default_request_update_ownership")]
    pub request_update_ownership: bool,
    /// Largest bundle accepted for staging in bytes; 0 disables the limit
    #[serde(default)]
    pub max_bundle_size: u64,
}

/// Host platform description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_platform_level")]
    pub level: u32,
    /// Force silent install on or off regardless of `level`
    #[serde(default)]
    pub silent_install: Option<bool>,
}

/// Security configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub empty_signature_policy: TrustPolicy,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            completion_timeout: default_completion_timeout(),
            installer_label: default_installer_label(),
            request_update_ownership: default_request_update_ownership(),
            max_bundle_size: 0,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            level: default_platform_level(),
            silent_install: None,
        }
    }
}

// Default value functions for serde
fn default_completion_timeout() -> u64 {
    300 // 5 minutes
}

fn default_installer_label() -> String {
    constants::DEFAULT_INSTALLER_LABEL.to_string()
}

fn default_request_update_ownership() -> bool {
    true
}

fn default_platform_level() -> u32 {
    constants::DEFAULT_PLATFORM_LEVEL
}

/// What the host installer supports, resolved once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    pub silent_install: bool,
    pub update_ownership: bool,
}

impl PlatformCapabilities {
    /// Capabilities implied by a platform level
    #[must_use]
    pub fn from_level(level: u32) -> Self {
        Self {
            silent_install: level >= constants::SILENT_INSTALL_MIN_LEVEL,
            update_ownership: level >= constants::UPDATE_OWNERSHIP_MIN_LEVEL,
        }
    }
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self::from_level(constants::DEFAULT_PLATFORM_LEVEL)
    }
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
        Ok(config_dir.join(constants::APP_DIR).join(constants::CONFIG_FILE))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
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
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
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
        // SIDELOAD_OUTPUT
        if let Ok(output) = std::env::var("SIDELOAD_OUTPUT") {
            self.general.default_output = match output.as_str() {
                "plain" => OutputFormat::Plain,
                "json" => OutputFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "SIDELOAD_OUTPUT".to_string(),
                        value: output,
                    }
                    .into())
                }
            };
        }

        if let Ok(dir) = std::env::var("SIDELOAD_STAGING_DIR") {
            self.paths.staging_dir = Some(PathBuf::from(dir));
        }

        if let Ok(dir) = std::env::var("SIDELOAD_SERVICE_ROOT") {
            self.paths.service_root = Some(PathBuf::from(dir));
        }

        // SIDELOAD_COMPLETION_TIMEOUT
        if let Ok(timeout) = std::env::var("SIDELOAD_COMPLETION_TIMEOUT") {
            self.install.completion_timeout =
                timeout.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "SIDELOAD_COMPLETION_TIMEOUT".to_string(),
                    value: timeout,
                })?;
        }

        // SIDELOAD_PLATFORM_LEVEL
        if let Ok(level) = std::env::var("SIDELOAD_PLATFORM_LEVEL") {
            self.platform.level = level.parse().map_err(|_| ConfigError::InvalidValue {
                field: "SIDELOAD_PLATFORM_LEVEL".to_string(),
                value: level,
            })?;
        }

        // SIDELOAD_SILENT_INSTALL
        if let Ok(silent) = std::env::var("SIDELOAD_SILENT_INSTALL") {
            self.platform.silent_install = Some(parse_bool("SIDELOAD_SILENT_INSTALL", silent)?);
        }

        // SIDELOAD_TRUST_POLICY
        if let Ok(policy) = std::env::var("SIDELOAD_TRUST_POLICY") {
            self.security.empty_signature_policy = match policy.as_str() {
                "lenient" => TrustPolicy::Lenient,
                "strict" => TrustPolicy::Strict,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "SIDELOAD_TRUST_POLICY".to_string(),
                        value: policy,
                    }
                    .into())
                }
            };
        }

        Ok(())
    }

    /// Resolve installer capabilities from the platform section
    #[must_use]
    pub fn capabilities(&self) -> PlatformCapabilities {
        let mut caps = PlatformCapabilities::from_level(self.platform.level);
        if let Some(silent) = self.platform.silent_install {
            caps.silent_install = silent;
        }
        caps
    }

    /// Completion wait limit; `None` means wait until reset
    #[must_use]
    pub fn completion_timeout(&self) -> Option<Duration> {
        match self.install.completion_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Get the staging path (with default)
    #[must_use]
    pub fn staging_path(&self) -> PathBuf {
        self.paths.staging_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(constants::APP_DIR)
                .join(constants::STAGING_DIR)
        })
    }

    /// Get the installer service root (with default)
    #[must_use]
    pub fn service_root(&self) -> PathBuf {
        self.paths
            .service_root
            .clone()
            .unwrap_or_else(|| data_dir().join(constants::SERVICE_DIR))
    }

    /// Get the log directory (with default)
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.paths
            .log_dir
            .clone()
            .unwrap_or_else(|| data_dir().join(constants::LOGS_DIR))
    }
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(constants::APP_DIR)
}

fn parse_bool(field: &str, value: String) -> Result<bool, Error> {
    match value.as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_thresholds() {
        let old = PlatformCapabilities::from_level(30);
        assert!(!old.silent_install);
        assert!(!old.update_ownership);

        let mid = PlatformCapabilities::from_level(31);
        assert!(mid.silent_install);
        assert!(!mid.update_ownership);

        let new = PlatformCapabilities::from_level(34);
        assert!(new.silent_install);
        assert!(new.update_ownership);
    }

    #[test]
    fn test_silent_install_override() {
        let mut config = Config::default();
        config.platform.silent_install = Some(false);
        assert!(!config.capabilities().silent_install);
        assert!(config.capabilities().update_ownership);
    }

    #[test]
    fn test_completion_timeout_zero_waits_forever() {
        let mut config = Config::default();
        assert_eq!(config.completion_timeout(), Some(Duration::from_secs(300)));
        config.install.completion_timeout = 0;
        assert_eq!(config.completion_timeout(), None);
    }
}
