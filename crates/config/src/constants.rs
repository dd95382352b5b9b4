//! Names and thresholds that are not exposed through TOML configuration

pub const APP_DIR: &str = "sideload";
pub const CONFIG_FILE: &str = "config.toml";

pub const STAGING_DIR: &str = "staging";
pub const SERVICE_DIR: &str = "service";
pub const LOGS_DIR: &str = "logs";

pub const DEFAULT_INSTALLER_LABEL: &str = "sideload";

/// First platform level on which the installer may skip the confirmation prompt
pub const SILENT_INSTALL_MIN_LEVEL: u32 = 31;
/// First platform level on which an installer can claim update ownership
pub const UPDATE_OWNERSHIP_MIN_LEVEL: u32 = 34;

pub const DEFAULT_PLATFORM_LEVEL: u32 = 34;
