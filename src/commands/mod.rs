//! Command implementations

pub mod dock;
pub mod flash;
pub mod show;

mod list;

pub use list::list_ports;

use std::time::Duration;

use flashdock_core::config::DockConfig;
use flashdock_core::flash::{FlashOptions, FlashOutcome};
use flashdock_core::loader::Loader;
use flashdock_rom::{RomError, RomOptions};
use thiserror::Error;

/// Errors reported by the commands
#[derive(Debug, Error)]
pub enum CommandError {
    /// No target connection was configured
    #[error("no target connection given. Use -p dev=<port> or set serial.connection")]
    NoConnection,

    /// The connection string or link could not be set up
    #[error(transparent)]
    Rom(#[from] RomError),

    /// The flash run did not succeed
    #[error("flash {0}")]
    Failed(FlashOutcome),
}

/// ROM loader options from the configuration
pub fn rom_options(config: &DockConfig) -> RomOptions {
    RomOptions {
        baud: config.serial.baud,
        timeout: Duration::from_millis(config.serial.timeout_ms),
        connect_attempts: config.serial.connect_attempts.max(1) as usize,
        ..RomOptions::default()
    }
}

/// Orchestrator options, with verification dropped when it is compiled out
pub fn flash_options(config: &DockConfig) -> FlashOptions {
    let mut options = config.flash_options();
    if options.verify && !cfg!(feature = "verify") {
        log::debug!("verification not compiled in, skipping");
        options.verify = false;
    }
    options
}

/// Build the loader for the configured connection
pub fn open_loader(config: &DockConfig) -> Result<Box<dyn Loader + Send>, CommandError> {
    let connection = config
        .serial
        .connection
        .as_deref()
        .ok_or(CommandError::NoConnection)?;
    Ok(flashdock_rom::open_loader(connection, rom_options(config))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rom_options_from_config() {
        let config = DockConfig::from_toml_str(
            r#"
            [serial]
            baud = 230400
            timeout_ms = 500
            connect_attempts = 0
            "#,
        )
        .unwrap();
        let options = rom_options(&config);
        assert_eq!(options.baud, 230_400);
        assert_eq!(options.timeout, Duration::from_millis(500));
        assert_eq!(options.connect_attempts, 1);
    }

    #[test]
    fn test_open_loader_requires_connection() {
        let config = DockConfig::default();
        assert!(matches!(
            open_loader(&config),
            Err(CommandError::NoConnection)
        ));
    }

    #[test]
    fn test_flash_options_respect_config() {
        let mut config = DockConfig::default();
        config.serial.baud_rate = Some(921_600);
        config.flash.verify = false;
        let options = flash_options(&config);
        assert_eq!(options.baud_rate, Some(921_600));
        assert!(!options.verify);
    }
}
