//! flashdock-rom - Espressif ROM serial bootloader support
//!
//! This crate implements the serial protocol spoken by the boot ROM of
//! ESP8266 and ESP32-family chips, and exposes it as a
//! [`Loader`](flashdock_core::loader::Loader).
//!
//! # Protocol Overview
//!
//! The target is reset into its ROM loader by toggling DTR and RTS, then
//! synchronized with a SYNC command. Commands and responses are
//! SLIP-framed packets. Images are written with FLASH_BEGIN followed by
//! one FLASH_DATA per 1 KiB block, and optionally checked with
//! SPI_FLASH_MD5.
//!
//! # Supported Transports
//!
//! - Serial port: `/dev/ttyUSB0`, `/dev/ttyACM0`, `COM1`, etc.
//! - TCP socket to a serial bridge: `host:port`
//!
//! # Example
//!
//! ```no_run
//! use flashdock_core::loader::Loader;
//! use flashdock_rom::{open_loader, RomOptions};
//!
//! let mut loader = open_loader("dev=/dev/ttyUSB0", RomOptions::default())?;
//! let identity = loader.connect()?;
//! println!("Found {}", identity.chip);
//! loader.disconnect();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(rust_2018_idioms)]

pub mod device;
pub mod error;
pub mod protocol;
pub mod slip;
pub mod transport;

// Re-exports
pub use device::{RomLoader, RomOptions};
pub use error::{Result, RomError};
pub use transport::serial::SerialTransport;
pub use transport::tcp::TcpTransport;
pub use transport::Transport;

use flashdock_core::loader::Loader;

/// Connection options for the ROM loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RomConnection {
    /// Serial port connection
    Serial {
        /// Device path (e.g., "/dev/ttyUSB0" or "COM1")
        device: String,
        /// Handshake rate (None for the session default)
        baud: Option<u32>,
    },
    /// TCP socket connection
    Tcp {
        /// Hostname or IP address
        host: String,
        /// Port number
        port: u16,
    },
}

impl RomConnection {
    /// Parse a connection string
    ///
    /// Formats:
    /// - `dev=/dev/ttyUSB0` - Serial with default baud
    /// - `dev=/dev/ttyUSB0:115200` - Serial with specified baud
    /// - `ip=host:port` - TCP connection
    pub fn parse(s: &str) -> Result<Self> {
        if let Some(dev) = s.strip_prefix("dev=") {
            match dev.rsplit_once(':') {
                Some((device, baud_str)) if !device.is_empty() => {
                    let baud = baud_str.parse().map_err(|_| {
                        RomError::InvalidConnection(format!("invalid baud rate: {}", baud_str))
                    })?;
                    Ok(RomConnection::Serial {
                        device: device.to_string(),
                        baud: Some(baud),
                    })
                }
                _ if dev.is_empty() => Err(RomError::InvalidConnection(
                    "missing device in dev= parameter".into(),
                )),
                _ => Ok(RomConnection::Serial {
                    device: dev.to_string(),
                    baud: None,
                }),
            }
        } else if let Some(ip) = s.strip_prefix("ip=") {
            let (host, port_str) = ip.rsplit_once(':').ok_or_else(|| {
                RomError::InvalidConnection("missing port in ip= parameter".into())
            })?;
            let port = port_str
                .parse()
                .map_err(|_| RomError::InvalidConnection(format!("invalid port: {}", port_str)))?;
            Ok(RomConnection::Tcp {
                host: host.to_string(),
                port,
            })
        } else {
            Err(RomError::InvalidConnection(format!(
                "{}. Use dev=... or ip=...",
                s
            )))
        }
    }
}

/// Build a loader for a connection string
///
/// The link itself is opened on every `connect`, so a bad device path is
/// reported as a handshake-time transport error.
pub fn open_loader(connection: &str, mut options: RomOptions) -> Result<Box<dyn Loader + Send>> {
    match RomConnection::parse(connection)? {
        RomConnection::Serial { device, baud } => {
            if let Some(baud) = baud {
                options.baud = baud;
            }
            let rate = options.baud;
            Ok(Box::new(RomLoader::new(options, move || {
                SerialTransport::open(&device, rate)
            })))
        }
        RomConnection::Tcp { host, port } => Ok(Box::new(RomLoader::new(options, move || {
            TcpTransport::connect(&host, port)
        }))),
    }
}
