//! Dock configuration file
//!
//! ```toml
//! storage_root = "/mnt/dock"
//! manifest_name = "flasher_args.json"
//!
//! [serial]
//! connection = "dev=/dev/ttyUSB0"
//! baud = 115200
//! baud_rate = 921600
//! timeout_ms = 3000
//! connect_attempts = 7
//!
//! [flash]
//! verify = true
//!
//! [buttons]
//! click = "flash"
//! double_click = "dump"
//! long_press = "rescan"
//! ```
//!
//! Every field is optional.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::device::Bindings;
use crate::discovery::MANIFEST_FILE_NAME;
use crate::flash::FlashOptions;

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// Configuration file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unknown keys
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    /// Connection string, `dev=<path>[:baud]` or `ip=<host>:<port>`
    pub connection: Option<String>,
    /// Rate used for the handshake
    pub baud: u32,
    /// Rate switched to after the handshake
    pub baud_rate: Option<u32>,
    /// Response timeout in milliseconds
    pub timeout_ms: u64,
    /// Reset-and-sync rounds before giving up
    pub connect_attempts: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            connection: None,
            baud: 115_200,
            baud_rate: None,
            timeout_ms: 3000,
            connect_attempts: 7,
        }
    }
}

/// Flash run settings
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlashConfig {
    /// Check every entry after writing it
    pub verify: bool,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self { verify: true }
    }
}

/// Top-level dock configuration
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DockConfig {
    /// Directory holding the dock storage
    pub storage_root: PathBuf,
    /// Manifest file name to search for
    pub manifest_name: String,
    /// Serial link
    pub serial: SerialConfig,
    /// Flash run
    pub flash: FlashConfig,
    /// Button bindings
    pub buttons: Bindings,
}

impl Default for DockConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("."),
            manifest_name: MANIFEST_FILE_NAME.to_string(),
            serial: SerialConfig::default(),
            flash: FlashConfig::default(),
            buttons: Bindings::default(),
        }
    }
}

impl DockConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        log::debug!("config: loaded {}", path.display());
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Orchestrator options implied by this configuration
    pub fn flash_options(&self) -> FlashOptions {
        FlashOptions {
            baud_rate: self.serial.baud_rate,
            verify: self.flash.verify,
        }
    }
}
