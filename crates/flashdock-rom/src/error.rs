//! Error types for ROM loader operations

use flashdock_core::ProtocolError;
use thiserror::Error;

use crate::protocol::{command_name, ROM_INVALID_MESSAGE};

/// ROM loader errors
#[derive(Debug, Error)]
pub enum RomError {
    /// Failed to open the link
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid connection string
    #[error("Invalid connection string: {0}")]
    InvalidConnection(String),

    /// No SYNC response within the retry budget
    #[error("Bootloader synchronization failed")]
    SyncFailed,

    /// An operation needs a connected target
    #[error("Not connected")]
    NotConnected,

    /// No response within the timeout
    #[error("Timeout waiting for response to command 0x{0:02X}")]
    Timeout(u8),

    /// The target rejected a command
    #[error("Command 0x{command:02X} failed with status 0x{status:02X}, error 0x{code:02X}")]
    Nak {
        /// Command opcode
        command: u8,
        /// Status byte
        status: u8,
        /// Error code
        code: u8,
    },

    /// A response frame could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serial port error
    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),
}

/// Result type for ROM loader operations
pub type Result<T> = core::result::Result<T, RomError>;

impl From<std::io::Error> for RomError {
    fn from(e: std::io::Error) -> Self {
        RomError::IoError(e.to_string())
    }
}

impl From<RomError> for ProtocolError {
    fn from(e: RomError) -> Self {
        match e {
            RomError::SyncFailed => ProtocolError::HandshakeFailed,
            RomError::Nak {
                command,
                code: ROM_INVALID_MESSAGE,
                ..
            } => ProtocolError::UnsupportedFunction(command_name(command)),
            RomError::Nak { command, code, .. } => ProtocolError::ProtocolNak { command, code },
            other => ProtocolError::TransportError(other.to_string()),
        }
    }
}
