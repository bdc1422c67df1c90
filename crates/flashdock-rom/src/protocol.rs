//! ROM bootloader protocol constants and packet codec
//!
//! Requests are `0x00, opcode, len:u16le, checksum:u32le, data`. Responses
//! are `0x01, opcode, len:u16le, value:u32le, data`, where the data ends in
//! status bytes: two on the ESP8266 ROM, four on every other chip.

use std::time::Duration;

use flashdock_core::chip::TargetChip;

use crate::error::{RomError, Result};

/// Request direction byte
pub const DIR_REQUEST: u8 = 0x00;
/// Response direction byte
pub const DIR_RESPONSE: u8 = 0x01;

// Command opcodes
/// Begin a flash download
pub const FLASH_BEGIN: u8 = 0x02;
/// Write one flash block
pub const FLASH_DATA: u8 = 0x03;
/// Synchronize with the ROM
pub const SYNC: u8 = 0x08;
/// Read a 32-bit register
pub const READ_REG: u8 = 0x0A;
/// Attach the SPI flash
pub const SPI_ATTACH: u8 = 0x0D;
/// Change the link rate
pub const CHANGE_BAUDRATE: u8 = 0x0F;
/// MD5 of a flash region
pub const SPI_FLASH_MD5: u8 = 0x13;

/// Error code for unknown or malformed commands
pub const ROM_INVALID_MESSAGE: u8 = 0x05;

/// Seed of the data checksum
pub const CHECKSUM_SEED: u8 = 0xEF;

/// Register holding the chip-detect magic value
pub const CHIP_DETECT_MAGIC_REG_ADDR: u32 = 0x4000_1000;

/// SYNC command payload
pub const SYNC_PAYLOAD: [u8; 36] = {
    let mut payload = [0x55u8; 36];
    payload[0] = 0x07;
    payload[1] = 0x07;
    payload[2] = 0x12;
    payload[3] = 0x20;
    payload
};

/// Default command timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
/// Timeout for the SYNC command
pub const SYNC_TIMEOUT: Duration = Duration::from_millis(100);
/// Erase time per megabyte
const ERASE_TIMEOUT_PER_MB: Duration = Duration::from_secs(30);
/// Digest time per megabyte
const MD5_TIMEOUT_PER_MB: Duration = Duration::from_secs(8);

/// Chip-detect magic values
const CHIP_MAGIC: &[(u32, TargetChip)] = &[
    (0xFFF0_C101, TargetChip::Esp8266),
    (0x00F0_1D83, TargetChip::Esp32),
    (0x0000_07C6, TargetChip::Esp32s2),
    (0x6921_506F, TargetChip::Esp32c3),
    (0x1B31_506F, TargetChip::Esp32c3),
    (0x0000_0009, TargetChip::Esp32s3),
    (0x6F51_306F, TargetChip::Esp32c2),
    (0x7C41_A06F, TargetChip::Esp32c2),
    (0xD7B7_3E80, TargetChip::Esp32h2),
    (0x2CE0_806F, TargetChip::Esp32c6),
];

/// Map a chip-detect magic value to a chip family
pub fn chip_from_magic(magic: u32) -> TargetChip {
    CHIP_MAGIC
        .iter()
        .find(|(m, _)| *m == magic)
        .map(|(_, chip)| *chip)
        .unwrap_or(TargetChip::Unknown)
}

/// Whether FLASH_BEGIN carries the trailing "encrypted" word
pub fn begin_has_encrypted_flag(chip: TargetChip) -> bool {
    !matches!(chip, TargetChip::Esp8266 | TargetChip::Esp32)
}

/// Human-readable command name
pub fn command_name(op: u8) -> &'static str {
    match op {
        FLASH_BEGIN => "FLASH_BEGIN",
        FLASH_DATA => "FLASH_DATA",
        SYNC => "SYNC",
        READ_REG => "READ_REG",
        SPI_ATTACH => "SPI_ATTACH",
        CHANGE_BAUDRATE => "CHANGE_BAUDRATE",
        SPI_FLASH_MD5 => "SPI_FLASH_MD5",
        _ => "UNKNOWN",
    }
}

/// Checksum of a FLASH_DATA block
pub fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(CHECKSUM_SEED, |acc, b| acc ^ b) as u32
}

/// Timeout for an erase of `size` bytes
pub fn erase_timeout(size: u32) -> Duration {
    scaled_timeout(ERASE_TIMEOUT_PER_MB, size)
}

/// Timeout for a digest of `size` bytes
pub fn md5_timeout(size: u32) -> Duration {
    scaled_timeout(MD5_TIMEOUT_PER_MB, size)
}

fn scaled_timeout(per_mb: Duration, size: u32) -> Duration {
    let scaled = per_mb.mul_f64(size as f64 / (1024.0 * 1024.0));
    scaled.max(DEFAULT_TIMEOUT)
}

/// Build an unframed request packet
pub fn encode_request(op: u8, data: &[u8], checksum: u32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(8 + data.len());
    packet.push(DIR_REQUEST);
    packet.push(op);
    packet.extend_from_slice(&(data.len() as u16).to_le_bytes());
    packet.extend_from_slice(&checksum.to_le_bytes());
    packet.extend_from_slice(data);
    packet
}

/// Concatenate little-endian words into a parameter block
pub fn words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// A decoded response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Opcode being answered
    pub op: u8,
    /// Value word (register contents for READ_REG)
    pub value: u32,
    /// Data without the trailing status bytes
    pub data: Vec<u8>,
    /// Non-zero on failure
    pub status: u8,
    /// Error code when `status` is non-zero
    pub error: u8,
}

impl Response {
    /// Parse an unframed response packet
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() < 8 {
            return Err(RomError::InvalidResponse(format!(
                "packet too short ({} bytes)",
                frame.len()
            )));
        }
        if frame[0] != DIR_RESPONSE {
            return Err(RomError::InvalidResponse(format!(
                "bad direction byte 0x{:02X}",
                frame[0]
            )));
        }

        let op = frame[1];
        let len = u16::from_le_bytes([frame[2], frame[3]]) as usize;
        let value = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        let body = &frame[8..];
        if body.len() < len || len < 2 {
            return Err(RomError::InvalidResponse(format!(
                "{} announced {} data bytes, got {}",
                command_name(op),
                len,
                body.len()
            )));
        }
        let body = &body[..len];

        // ESP8266 ROM: 2 status bytes, others: 4
        let status_len = if len == 2 || len == 18 { 2 } else { 4 };
        let status_len = status_len.min(len);
        let split = len - status_len;

        Ok(Self {
            op,
            value,
            data: body[..split].to_vec(),
            status: body[split],
            error: body[split + 1],
        })
    }

    /// Build an unframed response packet
    pub fn encode(&self, status_len: usize) -> Vec<u8> {
        let len = self.data.len() + status_len;
        let mut packet = Vec::with_capacity(8 + len);
        packet.push(DIR_RESPONSE);
        packet.push(self.op);
        packet.extend_from_slice(&(len as u16).to_le_bytes());
        packet.extend_from_slice(&self.value.to_le_bytes());
        packet.extend_from_slice(&self.data);
        packet.push(self.status);
        packet.push(self.error);
        packet.resize(8 + len, 0);
        packet
    }
}
