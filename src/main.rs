//! flashdock - USB flashing dock
//!
//! Finds an ESP-IDF `flasher_args.json` manifest in a storage directory
//! and programs its images into an Espressif target through the chip's
//! ROM serial bootloader.
//!
//! # Commands
//!
//! - `show` prints the manifest that would be flashed
//! - `flash` flashes it once
//! - `dock` runs the dock state machine, with button and storage events
//!   typed on the console
//! - `list-ports` lists serial ports

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use flashdock_core::config::{ConfigError, DockConfig};
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logger; RUST_LOG still wins when set
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(cli.verbose)),
    )
    .init();

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Show { storage } => {
            storage.apply(&mut config);
            commands::show::run_show(&config)
        }
        Commands::Flash { storage, link } => {
            storage.apply(&mut config);
            link.apply(&mut config);
            commands::flash::run_flash(&config)
        }
        Commands::Dock { storage, link } => {
            storage.apply(&mut config);
            link.apply(&mut config);
            commands::dock::run_dock(&config)
        }
        Commands::ListPorts => commands::list_ports(),
    }
}

/// Default log filter for a `-v` count
fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Load the configuration file, or defaults when none is given
fn load_config(path: Option<&Path>) -> Result<DockConfig, ConfigError> {
    match path {
        Some(path) => {
            let config = DockConfig::load(path)?;
            log::info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        None => Ok(DockConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_follows_verbosity() {
        assert_eq!(log_filter(0), "info");
        assert_eq!(log_filter(1), "debug");
        assert_eq!(log_filter(2), "trace");
        assert_eq!(log_filter(5), "trace");
    }
}
