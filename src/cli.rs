//! CLI argument parsing

use clap::{Parser, Subcommand};
use flashdock_core::config::DockConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flashdock")]
#[command(author, version, about = "USB flashing dock for Espressif targets", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (TOML format)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Manifest location options shared across commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct StorageArgs {
    /// Directory searched for the manifest (defaults to the configured storage root)
    pub dir: Option<PathBuf>,

    /// Manifest file name
    #[arg(long)]
    pub manifest_name: Option<String>,
}

/// Target link options shared across commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct LinkArgs {
    /// Target connection: dev=/dev/ttyUSB0[:baud] or ip=host:port
    #[arg(short, long)]
    pub port: Option<String>,

    /// Switch the link to this rate after the handshake
    #[arg(long)]
    pub baud_rate: Option<u32>,

    /// Skip MD5 verification of written regions
    #[arg(long)]
    pub no_verify: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find and print the manifest
    Show {
        #[command(flatten)]
        storage: StorageArgs,
    },

    /// Flash the manifest once
    Flash {
        #[command(flatten)]
        storage: StorageArgs,

        #[command(flatten)]
        link: LinkArgs,
    },

    /// Run the dock, driven by console events
    Dock {
        #[command(flatten)]
        storage: StorageArgs,

        #[command(flatten)]
        link: LinkArgs,
    },

    /// List serial ports
    ListPorts,
}

impl StorageArgs {
    /// Override configuration values given on the command line
    pub fn apply(&self, config: &mut DockConfig) {
        if let Some(dir) = &self.dir {
            config.storage_root = dir.clone();
        }
        if let Some(name) = &self.manifest_name {
            config.manifest_name = name.clone();
        }
    }
}

impl LinkArgs {
    /// Override configuration values given on the command line
    pub fn apply(&self, config: &mut DockConfig) {
        if let Some(port) = &self.port {
            config.serial.connection = Some(port.clone());
        }
        if let Some(rate) = self.baud_rate {
            config.serial.baud_rate = Some(rate);
        }
        if self.no_verify {
            config.flash.verify = false;
        }
    }
}
