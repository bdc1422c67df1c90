//! Error types for flashdock-core

use std::path::PathBuf;

use thiserror::Error;

use crate::chip::TargetChip;

/// Errors raised while locating or building a manifest
///
/// Any of these aborts the whole manifest build; a partially parsed
/// manifest is never returned.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// No manifest file below the storage root
    #[error("manifest \"{name}\" not found under {root}")]
    NotFound {
        /// File name searched for
        name: String,
        /// Directory the search started at
        root: PathBuf,
    },

    /// The document is not valid JSON or has the wrong shape
    #[error("malformed manifest: {0}")]
    MalformedDocument(String),

    /// A required field is absent
    #[error("manifest is missing required field \"{0}\"")]
    MissingRequiredField(&'static str),

    /// The file list exists but has no entries
    #[error("manifest file list is empty")]
    EmptyFileList,

    /// A load address key could not be parsed
    #[error("invalid load address \"{0}\"")]
    InvalidAddress(String),

    /// A referenced payload does not exist or cannot be stat'd
    #[error("payload file {path} is missing: {source}")]
    PayloadFileMissing {
        /// Resolved payload path
        path: PathBuf,
        /// Underlying stat error
        #[source]
        source: std::io::Error,
    },

    /// A referenced payload is empty
    #[error("payload file {0} is empty")]
    EmptyPayload(PathBuf),

    /// A payload is larger than the 32-bit address space
    #[error("payload file {path} is too large ({size} bytes)")]
    PayloadTooLarge {
        /// Resolved payload path
        path: PathBuf,
        /// Size reported by the filesystem
        size: u64,
    },

    /// Memory for the manifest could not be reserved
    #[error("failed to allocate manifest storage")]
    AllocationFailed,

    /// Reading the manifest or walking the storage failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a bootloader protocol driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// No valid handshake response within the retry budget
    #[error("handshake with target failed")]
    HandshakeFailed,

    /// The target does not implement the requested operation
    #[error("{0} is not supported by the target")]
    UnsupportedFunction(&'static str),

    /// The link failed or timed out
    #[error("transport error: {0}")]
    TransportError(String),

    /// The target rejected a command
    #[error("target rejected command 0x{command:02X} (error 0x{code:02X})")]
    ProtocolNak {
        /// Command opcode
        command: u8,
        /// Error code reported by the target
        code: u8,
    },

    /// Digest of the written region differs from the local one
    #[error("checksum mismatch: expected {expected}, target reported {actual}")]
    ChecksumMismatch {
        /// Digest of the data sent
        expected: String,
        /// Digest reported by the target
        actual: String,
    },

    /// The payload ended before the announced length
    #[error("image truncated: expected {expected} bytes, source ended after {delivered}")]
    TruncatedImage {
        /// Announced image length
        expected: u32,
        /// Bytes actually read from the source
        delivered: u32,
    },

    /// The chip on the wire is not the one the manifest targets
    #[error("target chip mismatch: manifest targets {expected}, found {found}")]
    IdentityMismatch {
        /// Chip named by the manifest
        expected: TargetChip,
        /// Chip that answered the handshake
        found: TargetChip,
    },
}

/// Reasons a flash run fails
#[derive(Debug, Error)]
pub enum FlashError {
    /// The bootloader protocol failed
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A payload could not be re-opened at flash time
    #[error("cannot open payload {path}: {source}")]
    Payload {
        /// Payload path from the manifest
        path: PathBuf,
        /// Underlying open error
        #[source]
        source: std::io::Error,
    },

    /// A payload's size differs from the one recorded in the manifest
    #[error("payload {path} changed size since discovery ({expected} -> {actual} bytes)")]
    PayloadChanged {
        /// Payload path from the manifest
        path: PathBuf,
        /// Size recorded when the manifest was built
        expected: u32,
        /// Size found at flash time
        actual: u64,
    },
}

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, ManifestError>;
